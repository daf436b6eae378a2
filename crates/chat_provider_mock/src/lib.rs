//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing of the turn pipeline.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chat_provider::{
    BackendProfile, CancelSignal, ChatBackend, ChunkStream, ResponseChunk, SourceError,
    StreamRequest,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One scripted element of a mock reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Waits `delay`, then yields a well-formed text chunk.
    Text { text: String, delay: Duration },
    /// Yields a chunk with no candidates.
    Malformed,
    /// Yields a mid-stream source error.
    Fail(String),
    /// Blocks until the turn is cancelled.
    Hang,
}

impl MockStep {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn delayed(text: impl Into<String>, delay: Duration) -> Self {
        Self::Text {
            text: text.into(),
            delay,
        }
    }
}

/// Deterministic mock backend used by `chat_session` tests and offline runs.
#[derive(Debug)]
pub struct MockBackend {
    steps: Vec<MockStep>,
    open_error: Option<String>,
    summary: String,
    models: Vec<String>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl MockBackend {
    /// Creates a mock backend that replays `steps` for every stream.
    #[must_use]
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps,
            open_error: None,
            summary: "mock chat summary".to_string(),
            models: vec!["mock".to_string(), "mock-alt".to_string()],
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Streams `count` fragments `"Chunk 0"`, `"Chunk 1"`, ... with `interval`
    /// between consecutive fragments.
    #[must_use]
    pub fn simulated(count: usize, interval: Duration) -> Self {
        let steps = (0..count)
            .map(|index| {
                let delay = if index == 0 { Duration::ZERO } else { interval };
                MockStep::delayed(format!("Chunk {index}"), delay)
            })
            .collect();
        Self::new(steps)
    }

    /// Makes every `open_stream` call fail before producing any chunk.
    #[must_use]
    pub fn with_open_error(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Sets the reply returned by non-streaming `send`.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Returns every request received so far, streaming and non-streaming.
    #[must_use]
    pub fn requests(&self) -> Vec<StreamRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    fn record(&self, req: StreamRequest) {
        lock_unpoisoned(&self.requests).push(req);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        const TOKEN_DELAY: Duration = Duration::from_millis(40);
        let reply = [
            "## Mocked reply\n",
            "A streaming demonstration with **bold**, *italic* and `inline code`.\n",
            "\n",
            "- First point.\n",
            "- Second point.\n",
            "\n",
            "```rust\n",
            "fn main() {\n",
            "    println!(\"Hello, stream\");\n",
            "}\n",
            "```\n",
            "\n",
            "> Final text always matches every streamed chunk.\n",
            "Completed.\n",
        ];

        let mut steps = Vec::new();
        for line in reply {
            let mut pending_token = String::new();
            for ch in line.chars() {
                pending_token.push(ch);
                if matches!(ch, ' ' | '\n') {
                    steps.push(MockStep::delayed(
                        std::mem::take(&mut pending_token),
                        TOKEN_DELAY,
                    ));
                }
            }
            if !pending_token.is_empty() {
                steps.push(MockStep::delayed(pending_token, TOKEN_DELAY));
            }
        }

        Self::new(steps)
    }
}

impl ChatBackend for MockBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self
                .models
                .first()
                .cloned()
                .unwrap_or_else(|| MOCK_PROVIDER_ID.to_string()),
        }
    }

    fn open_stream(
        &self,
        req: StreamRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, SourceError> {
        self.record(req);

        if let Some(message) = &self.open_error {
            return Err(SourceError::new(message.clone()));
        }

        Ok(Box::new(MockStream {
            steps: self.steps.clone().into_iter(),
            cancel,
            finished: false,
        }))
    }

    fn send(&self, req: StreamRequest) -> Result<ResponseChunk, SourceError> {
        self.record(req);
        Ok(ResponseChunk::from_text(self.summary.clone()))
    }

    fn list_models(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.models.clone())
    }
}

struct MockStream {
    steps: std::vec::IntoIter<MockStep>,
    cancel: CancelSignal,
    finished: bool,
}

impl MockStream {
    fn finish_with(
        &mut self,
        item: Result<ResponseChunk, SourceError>,
    ) -> Option<Result<ResponseChunk, SourceError>> {
        if item.is_err() {
            self.finished = true;
        }
        Some(item)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleeps for `delay` unless cancelled first; returns false when cancelled.
    fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
        }
    }
}

impl Iterator for MockStream {
    type Item = Result<ResponseChunk, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.is_cancelled() {
            return self.finish_with(Err(SourceError::cancelled()));
        }

        let step = self.steps.next()?;
        match step {
            MockStep::Text { text, delay } => {
                if !self.sleep_unless_cancelled(delay) {
                    return self.finish_with(Err(SourceError::cancelled()));
                }
                self.finish_with(Ok(ResponseChunk::from_text(text)))
            }
            MockStep::Malformed => self.finish_with(Ok(ResponseChunk::default())),
            MockStep::Fail(message) => self.finish_with(Err(SourceError::new(message))),
            MockStep::Hang => {
                while !self.is_cancelled() {
                    thread::sleep(CANCEL_POLL_INTERVAL);
                }
                self.finish_with(Err(SourceError::cancelled()))
            }
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
