//! Per-turn orchestration of presenter, aggregator and optional watchdog.
//!
//! Teardown always runs in the same order, including when the stream never
//! opened: raise the stop signal, close the channel, then join the
//! presenter. Nothing is rendered after [`run_turn`] returns.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Duration;

use chat_provider::{CancelSignal, ChunkStream, SourceError};

use crate::aggregator::{aggregate, Aggregation, ConversationTurn};
use crate::delivery::{self, DEFAULT_DELIVERY_CAPACITY};
use crate::presenter::{Presenter, PresenterReport, StopSignal, DEFAULT_PRESENTER_TICK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    pub delivery_capacity: usize,
    pub presenter_tick: Duration,
    /// Cancels the turn once this much time has passed.
    pub timeout: Option<Duration>,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
            presenter_tick: DEFAULT_PRESENTER_TICK,
            timeout: None,
        }
    }
}

#[derive(Debug)]
pub struct TurnOutcome {
    /// `Err` when the stream could not be opened.
    pub stream: Result<Aggregation, SourceError>,
    /// `None` when the presenter could not start or panicked.
    pub presenter: Option<PresenterReport>,
    /// The watchdog fired and raised the cancel signal.
    pub timed_out: bool,
}

/// Runs one turn: starts the presenter, opens and aggregates the stream on
/// the calling thread, then tears down.
pub fn run_turn<O, F>(
    settings: &TurnSettings,
    turn: ConversationTurn,
    cancel: &CancelSignal,
    open: O,
    on_fragment: F,
) -> TurnOutcome
where
    O: FnOnce() -> Result<ChunkStream, SourceError>,
    F: FnMut(&str) + Send,
{
    thread::scope(|scope| {
        let (mut sender, receiver) = delivery::channel(settings.delivery_capacity);
        let stop = StopSignal::new();

        let presenter = Presenter::new(receiver, stop.clone(), settings.presenter_tick, on_fragment);
        let presenter_handle = thread::Builder::new()
            .name("chat-presenter".to_string())
            .spawn_scoped(scope, move || presenter.run());
        let presenter_handle = match presenter_handle {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::error!(%error, "failed to start presenter thread");
                None
            }
        };

        let watchdog = settings
            .timeout
            .and_then(|after| Watchdog::start(scope, after, Arc::clone(cancel)));

        let stream = match open() {
            Ok(stream) => Ok(aggregate(turn, stream, &mut sender, cancel)),
            Err(error) => {
                tracing::warn!(%error, "reply stream could not be opened");
                Err(error)
            }
        };

        stop.signal();
        sender.close();
        let presenter = presenter_handle.and_then(|handle| match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                tracing::error!("presenter thread panicked; remaining fragments were not rendered");
                None
            }
        });
        let timed_out = watchdog.is_some_and(Watchdog::finish);

        if let Some(report) = &presenter {
            tracing::debug!(
                rendered = report.rendered,
                skipped = report.skipped,
                state = ?report.final_state,
                "presenter finished"
            );
        }

        TurnOutcome {
            stream,
            presenter,
            timed_out,
        }
    })
}

/// Raises the cancel signal if the turn outlives its deadline.
struct Watchdog<'scope> {
    done: mpsc::Sender<()>,
    handle: ScopedJoinHandle<'scope, bool>,
}

impl<'scope> Watchdog<'scope> {
    fn start<'env>(
        scope: &'scope Scope<'scope, 'env>,
        after: Duration,
        cancel: CancelSignal,
    ) -> Option<Self> {
        let (done, done_rx) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("chat-turn-watchdog".to_string())
            .spawn_scoped(scope, move || match done_rx.recv_timeout(after) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(?after, "turn deadline passed, cancelling");
                    cancel.store(true, Ordering::Release);
                    true
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
            });

        match spawned {
            Ok(handle) => Some(Self { done, handle }),
            Err(error) => {
                tracing::error!(%error, "failed to start turn watchdog; timeout disabled");
                None
            }
        }
    }

    /// Stops the watchdog and reports whether it fired.
    fn finish(self) -> bool {
        drop(self.done);
        self.handle.join().unwrap_or(false)
    }
}
