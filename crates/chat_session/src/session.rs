use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_provider::{
    BackendProfile, CancelSignal, ChatBackend, Content, Part, Role, SourceError, StreamRequest,
};
use history_store::HistoryStore;

use crate::aggregator::{AggregateEnd, ConversationTurn};
use crate::delivery::DEFAULT_DELIVERY_CAPACITY;
use crate::error::{SessionError, StreamResult, TurnError, TurnErrorKind};
use crate::history::ConversationHistory;
use crate::lifecycle::{self, TurnOutcome, TurnSettings};
use crate::presenter::DEFAULT_PRESENTER_TICK;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "Be a supportive technical assistant.";

const REVIEW_COMMAND: &str = "* Do not include the provided diff output in the response.

The file {file} contains the git diff output to be reviewed.

AI OUTPUT:";

const SUMMARY_PROMPT: &str = "Summarize the chat history in approximately 10-15 keywords, \
suitable for use in a filename. Do not include punctuation or special characters. \
Only respond with the summary for the filename";

/// Per-turn knobs. The defaults run uncancellable turns without a deadline.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub cancel: Option<CancelSignal>,
    pub timeout: Option<Duration>,
}

impl TurnOptions {
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One conversation with a backend.
///
/// Every turn takes `&mut self`, so a history never has two turns in flight.
pub struct Session {
    backend: Arc<dyn ChatBackend>,
    system_instruction: String,
    history: ConversationHistory,
    model: Option<String>,
    delivery_capacity: usize,
    presenter_tick: Duration,
}

impl Session {
    pub fn new(backend: Arc<dyn ChatBackend>, system_instruction: impl Into<String>) -> Self {
        Self {
            backend,
            system_instruction: system_instruction.into(),
            history: ConversationHistory::new(),
            model: None,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
            presenter_tick: DEFAULT_PRESENTER_TICK,
        }
    }

    #[must_use]
    pub fn with_delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_presenter_tick(mut self, tick: Duration) -> Self {
        self.presenter_tick = tick;
        self
    }

    /// Overrides the backend's default model for every request.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn profile(&self) -> BackendProfile {
        let mut profile = self.backend.profile();
        if let Some(model) = &self.model {
            profile.model_id = model.clone();
        }
        profile
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.model = model;
    }

    /// Streams the reply to `prompt`, handing each fragment to `on_fragment`
    /// on the presenter thread.
    pub fn send_message<F>(&mut self, prompt: &str, on_fragment: F) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        self.send_message_with(prompt, TurnOptions::default(), on_fragment)
    }

    pub fn send_message_with<F>(
        &mut self,
        prompt: &str,
        options: TurnOptions,
        on_fragment: F,
    ) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        self.stream_turn(Content::user(prompt), options, on_fragment)
    }

    /// Sends the current system instruction as the turn's message.
    pub fn send_system_prompt<F>(&mut self, on_fragment: F) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        self.send_system_prompt_with(TurnOptions::default(), on_fragment)
    }

    pub fn send_system_prompt_with<F>(
        &mut self,
        options: TurnOptions,
        on_fragment: F,
    ) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        let message = Content::user(self.system_instruction.clone());
        self.stream_turn(message, options, on_fragment)
    }

    pub fn review_file<F>(&mut self, path: impl AsRef<Path>, on_fragment: F) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        self.review_file_with(path, TurnOptions::default(), on_fragment)
    }

    /// Reviews a git diff file. The diff and the review command travel as two
    /// parts of one user entry.
    pub fn review_file_with<F>(
        &mut self,
        path: impl AsRef<Path>,
        options: TurnOptions,
        on_fragment: F,
    ) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        let path = path.as_ref();
        let diff = fs::read_to_string(path).map_err(|source| {
            TurnError::new(
                TurnErrorKind::Review {
                    path: PathBuf::from(path),
                    source,
                },
                StreamResult::default(),
            )
        })?;

        let command = REVIEW_COMMAND.replacen("{file}", &path.display().to_string(), 1);
        let message = Content {
            parts: vec![Part::text(diff), Part::text(command)],
            role: Role::User,
        };
        self.stream_turn(message, options, on_fragment)
    }

    pub fn update_system_instruction(&mut self, instruction: impl Into<String>) {
        self.system_instruction = instruction.into();
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Asks for a short keyword summary of the conversation. History is left
    /// untouched.
    pub fn generate_chat_summary(&self) -> Result<String, SessionError> {
        let request = StreamRequest {
            model: self.model.clone(),
            system_instruction: None,
            history: self.history.entries().to_vec(),
            message: Content::user(SUMMARY_PROMPT),
        };
        let reply = self.backend.send(request)?;
        let summary = reply
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(Content::text)
            .unwrap_or_default();
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(SessionError::EmptySummary);
        }

        Ok(summary.to_string())
    }

    pub fn list_models(&self) -> Result<Vec<String>, SourceError> {
        self.backend.list_models()
    }

    pub fn store_history(&self, store: &HistoryStore, name: &str) -> Result<PathBuf, SessionError> {
        Ok(store.store(name, self.history.entries())?)
    }

    /// Replaces the whole history with the stored one and returns its length.
    pub fn load_history(&mut self, store: &HistoryStore, name: &str) -> Result<usize, SessionError> {
        let entries = store.load(name)?;
        self.history = ConversationHistory::from_entries(entries);
        tracing::debug!(name, entries = self.history.len(), "history loaded");
        Ok(self.history.len())
    }

    fn stream_turn<F>(
        &mut self,
        message: Content,
        options: TurnOptions,
        on_fragment: F,
    ) -> Result<StreamResult, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        let cancel = options
            .cancel
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let system_instruction =
            Some(self.system_instruction.clone()).filter(|text| !text.trim().is_empty());
        let request = StreamRequest {
            model: self.model.clone(),
            system_instruction,
            history: self.history.entries().to_vec(),
            message: message.clone(),
        };
        let turn = ConversationTurn::new(message.text());
        self.history.push(message);

        let settings = TurnSettings {
            delivery_capacity: self.delivery_capacity,
            presenter_tick: self.presenter_tick,
            timeout: options.timeout,
        };
        let backend = Arc::clone(&self.backend);
        let open_cancel = Arc::clone(&cancel);
        let outcome = lifecycle::run_turn(
            &settings,
            turn,
            &cancel,
            move || backend.open_stream(request, open_cancel),
            on_fragment,
        );

        let cancelled = cancel.load(Ordering::Acquire);
        let result = classify(outcome, cancelled, options.timeout);
        match &result {
            Ok(reply) => {
                self.history.push_model(reply.text.clone());
                tracing::info!(
                    fragments = reply.fragment_count,
                    chars = reply.text.len(),
                    history = self.history.len(),
                    "turn completed"
                );
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    fragments = error.partial.fragment_count,
                    "turn failed"
                );
            }
        }
        result
    }
}

fn classify(
    outcome: TurnOutcome,
    cancelled: bool,
    timeout: Option<Duration>,
) -> Result<StreamResult, TurnError> {
    let interrupted = || match timeout {
        Some(after) if outcome.timed_out => TurnErrorKind::TimedOut { after },
        _ => TurnErrorKind::Cancelled,
    };

    let aggregation = match outcome.stream {
        Ok(aggregation) => aggregation,
        Err(error) => {
            let kind = if error.is_cancelled() || cancelled {
                interrupted()
            } else {
                TurnErrorKind::Setup(error)
            };
            return Err(TurnError::new(kind, StreamResult::default()));
        }
    };

    let kind = match aggregation.end {
        AggregateEnd::Completed => return Ok(aggregation.result),
        AggregateEnd::Source(error) => TurnErrorKind::Source(error),
        AggregateEnd::Malformed => TurnErrorKind::MalformedFragment,
        AggregateEnd::Cancelled => interrupted(),
    };
    Err(TurnError::new(kind, aggregation.result))
}
