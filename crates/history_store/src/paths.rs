use std::path::PathBuf;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::HistoryStoreError;

pub const HISTORY_DIR: [&str; 2] = ["ai-chat", "history"];

const FALLBACK_SUMMARY: &str = "chat_summary";

/// Returns `<config dir>/ai-chat/history` without creating it.
pub fn default_history_root() -> Result<PathBuf, HistoryStoreError> {
    let config_dir = dirs::config_dir().ok_or(HistoryStoreError::NoConfigDir)?;
    Ok(config_dir.join(HISTORY_DIR[0]).join(HISTORY_DIR[1]))
}

/// Lowercases, turns spaces into underscores and keeps only `[a-z0-9._-]`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Builds `chat_<yyyymmddhhmmss>_<summary>.json`, sanitized.
///
/// An empty summary falls back to `chat_summary`.
pub fn history_file_name(
    summary: &str,
    timestamp: OffsetDateTime,
) -> Result<String, HistoryStoreError> {
    let summary = summary.trim();
    let summary = if summary.is_empty() {
        FALLBACK_SUMMARY
    } else {
        summary
    };
    let stamp = timestamp.format(format_description!(
        "[year][month][day][hour repr:24][minute][second]"
    ))?;

    Ok(sanitize_file_name(&format!("chat_{stamp}_{summary}.json")))
}

pub(crate) fn validate_file_name(name: &str) -> Result<(), HistoryStoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        return Err(HistoryStoreError::InvalidFileName {
            name: name.to_string(),
        });
    }

    Ok(())
}
