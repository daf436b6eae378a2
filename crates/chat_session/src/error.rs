use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chat_provider::SourceError;
use history_store::HistoryStoreError;
use thiserror::Error;

/// Aggregated reply of one turn. Returned on success and attached to every
/// [`TurnError`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamResult {
    pub text: String,
    pub fragment_count: usize,
}

#[derive(Debug, Error)]
pub enum TurnErrorKind {
    #[error("failed to open reply stream: {0}")]
    Setup(SourceError),
    #[error("reply stream failed: {0}")]
    Source(SourceError),
    #[error("received malformed chunk data")]
    MalformedFragment,
    #[error("turn was cancelled")]
    Cancelled,
    #[error("turn timed out after {after:?}")]
    TimedOut { after: Duration },
    #[error("failed to read review file {}: {source}", path.display())]
    Review {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A failed turn together with whatever was aggregated before the failure.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct TurnError {
    pub kind: TurnErrorKind,
    pub partial: StreamResult,
}

impl TurnError {
    pub fn new(kind: TurnErrorKind, partial: StreamResult) -> Self {
        Self { kind, partial }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.kind,
            TurnErrorKind::Cancelled | TurnErrorKind::TimedOut { .. }
        )
    }
}

/// Failures of session operations that are not streamed turns.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    History(#[from] HistoryStoreError),
    #[error("model returned an empty chat summary")]
    EmptySummary,
}
