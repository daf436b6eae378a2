//! Lossless accumulation of one reply stream.

use std::sync::atomic::Ordering;

use chat_provider::{CancelSignal, ChunkStream, SourceError};

use crate::delivery::{FragmentSender, SendOutcome};
use crate::error::StreamResult;

/// Why the aggregator stopped pulling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateEnd {
    Completed,
    Source(SourceError),
    Malformed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub result: StreamResult,
    pub end: AggregateEnd,
    /// Fragments the presentation path discarded.
    pub dropped: usize,
}

/// Diagnostic record of one turn, discarded once the result is built.
#[derive(Debug, Default)]
pub struct ConversationTurn {
    pub prompt: String,
    pub fragments: Vec<String>,
}

impl ConversationTurn {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            fragments: Vec::new(),
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    fn into_result(self) -> StreamResult {
        StreamResult {
            fragment_count: self.fragments.len(),
            text: self.fragments.concat(),
        }
    }
}

/// Pulls `stream` to the end, forwarding each fragment to `sender` without
/// ever waiting on it.
pub fn aggregate(
    mut turn: ConversationTurn,
    mut stream: ChunkStream,
    sender: &mut FragmentSender,
    cancel: &CancelSignal,
) -> Aggregation {
    let end = loop {
        if cancel.load(Ordering::Acquire) {
            break AggregateEnd::Cancelled;
        }

        let chunk = match stream.next() {
            None => break AggregateEnd::Completed,
            Some(Err(error)) if error.is_cancelled() || cancel.load(Ordering::Acquire) => {
                break AggregateEnd::Cancelled;
            }
            Some(Err(error)) => break AggregateEnd::Source(error),
            Some(Ok(chunk)) => chunk,
        };

        let Some(part) = chunk.first_part() else {
            tracing::warn!(
                received = turn.fragment_count(),
                "received nil or malformed chunk from stream"
            );
            break AggregateEnd::Malformed;
        };

        let text = part.text.clone();
        if sender.try_send(text.clone()) == SendOutcome::Dropped {
            tracing::trace!(seq = turn.fragment_count(), "delivery channel full, fragment dropped");
        }
        turn.fragments.push(text);
    };

    tracing::debug!(
        fragments = turn.fragment_count(),
        dropped = sender.dropped(),
        prompt_len = turn.prompt.len(),
        end = ?end,
        "reply stream finished"
    );

    Aggregation {
        dropped: sender.dropped(),
        result: turn.into_result(),
        end,
    }
}
