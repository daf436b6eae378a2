//! Minimal provider-agnostic contract for streaming one chat turn.
//!
//! This crate defines the content model shared by the session core, the
//! history store and every backend, plus the [`ChatBackend`] trait that yields
//! a turn's reply as a lazy sequence of [`ResponseChunk`]s. It excludes
//! transport details and any turn orchestration.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

/// Shared cancellation flag for one turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Lazy, non-restartable sequence of reply chunks.
///
/// `None` means the source is exhausted; `Some(Err(_))` is a mid-stream failure.
pub type ChunkStream = Box<dyn Iterator<Item = Result<ResponseChunk, SourceError>> + Send>;

/// Error returned while constructing/configuring a backend before any turn starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new backend initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Failure reported by a chunk source, either while opening or mid-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    message: String,
    cancelled: bool,
}

impl SourceError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cancelled: false,
        }
    }

    /// Error a source returns when it stopped because the cancel signal was set.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            message: "request was cancelled".to_string(),
            cancelled: true,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SourceError {}

impl From<String> for SourceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for SourceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Author of a content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One text part of a content entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Role-tagged content, the unit of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Role,
}

impl Content {
    /// Builds single-part content.
    #[must_use]
    pub fn from_text(text: impl Into<String>, role: Role) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::from_text(text, Role::User)
    }

    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self::from_text(text, Role::Model)
    }

    /// Concatenates the text of every part.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().map(|part| part.text.as_str()).collect()
    }
}

/// One reply candidate carried by a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

/// One element of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseChunk {
    pub candidates: Vec<Candidate>,
}

impl ResponseChunk {
    /// Builds a well-formed chunk carrying one model text part.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content::model(text)),
                finish_reason: None,
            }],
        }
    }

    /// Returns the first part of the first candidate, or `None` when the chunk
    /// is structurally incomplete.
    #[must_use]
    pub fn first_part(&self) -> Option<&Part> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()
    }
}

/// Input required to stream one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    /// Conversation entries preceding `message`.
    pub history: Vec<Content>,
    pub message: Content,
}

impl StreamRequest {
    /// Returns history followed by the new message.
    #[must_use]
    pub fn contents(&self) -> Vec<Content> {
        let mut contents = self.history.clone();
        contents.push(self.message.clone());
        contents
    }
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Backend interface for streaming chat turns.
pub trait ChatBackend: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> BackendProfile;

    /// Opens a reply stream for `req`.
    ///
    /// An `Err` here means no chunk was ever produced. Sources must observe
    /// `cancel` and end the stream promptly once it is set.
    fn open_stream(
        &self,
        req: StreamRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, SourceError>;

    /// Sends `req` without streaming and returns the whole reply as one chunk.
    fn send(&self, req: StreamRequest) -> Result<ResponseChunk, SourceError>;

    /// Lists model identifiers available to this backend.
    fn list_models(&self) -> Result<Vec<String>, SourceError> {
        Err(SourceError::new(
            "Model listing is not supported by this provider",
        ))
    }
}
