use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chat_provider::Content;

use crate::error::HistoryStoreError;
use crate::paths::{default_history_root, validate_file_name};

/// Directory of stored chat histories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    /// Uses `root` as-is; the directory is created on the first store.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the store under the user configuration directory.
    pub fn open_default() -> Result<Self, HistoryStoreError> {
        Ok(Self::new(default_history_root()?))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the full path for `name`, validating that it is a plain file name.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, HistoryStoreError> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// Writes the whole history, replacing any previous file with this name.
    pub fn store(&self, name: &str, history: &[Content]) -> Result<PathBuf, HistoryStoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root).map_err(|source| {
            HistoryStoreError::io("creating history directory", &self.root, source)
        })?;

        let json = serde_json::to_vec_pretty(history)
            .map_err(|source| HistoryStoreError::json_serialize(&path, source))?;
        fs::write(&path, json)
            .map_err(|source| HistoryStoreError::io("writing history file", &path, source))?;

        tracing::debug!(path = %path.display(), entries = history.len(), "chat history stored");
        Ok(path)
    }

    /// Reads a whole history back in stored order.
    pub fn load(&self, name: &str) -> Result<Vec<Content>, HistoryStoreError> {
        let path = self.path_for(name)?;
        let json = match fs::read(&path) {
            Ok(json) => json,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(HistoryStoreError::NotFound {
                    root: self.root.clone(),
                    name: name.to_string(),
                });
            }
            Err(source) => {
                return Err(HistoryStoreError::io("reading history file", &path, source));
            }
        };

        let history: Vec<Content> = serde_json::from_slice(&json)
            .map_err(|source| HistoryStoreError::json_parse(&path, source))?;

        tracing::debug!(path = %path.display(), entries = history.len(), "chat history loaded");
        Ok(history)
    }

    /// Lists stored file names in lexical order. A missing root lists nothing.
    pub fn list(&self) -> Result<Vec<String>, HistoryStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryStoreError::io(
                    "listing history directory",
                    &self.root,
                    source,
                ));
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| {
                HistoryStoreError::io("listing history directory", &self.root, source)
            })?;
            let is_file = entry
                .file_type()
                .map(|file_type| file_type.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<(), HistoryStoreError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(HistoryStoreError::NotFound {
                root: self.root.clone(),
                name: name.to_string(),
            }),
            Err(source) => Err(HistoryStoreError::io("deleting history file", &path, source)),
        }
    }
}
