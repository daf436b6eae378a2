//! Single-consumer render loop for one turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::delivery::{FragmentReceiver, Received};

/// Longest the presenter waits on an empty channel before rechecking stop.
pub const DEFAULT_PRESENTER_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Turn-scoped stop request. Only the first `signal` has any effect.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that raised the signal.
    pub fn signal(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_signalled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenterReport {
    /// Fragments handed to the render callback.
    pub rendered: usize,
    /// Gaps in the sequence numbers seen, i.e. fragments dropped upstream.
    pub skipped: u64,
    pub final_state: PresenterState,
}

pub struct Presenter<F> {
    receiver: FragmentReceiver,
    stop: StopSignal,
    tick: Duration,
    render: F,
    state: PresenterState,
    rendered: usize,
    next_seq: u64,
    skipped: u64,
}

impl<F> Presenter<F>
where
    F: FnMut(&str),
{
    pub fn new(receiver: FragmentReceiver, stop: StopSignal, tick: Duration, render: F) -> Self {
        Self {
            receiver,
            stop,
            tick,
            render,
            state: PresenterState::Idle,
            rendered: 0,
            next_seq: 0,
            skipped: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> PresenterState {
        self.state
    }

    /// Runs until stopped and drained, or until the channel is closed and empty.
    pub fn run(mut self) -> PresenterReport {
        self.transition(PresenterState::Running);

        while self.state == PresenterState::Running {
            match self.receiver.recv_timeout(self.tick) {
                Received::Fragment(envelope) => self.render(envelope.seq, &envelope.text),
                Received::Empty => {}
                Received::Closed => {
                    // Nothing left to drain.
                    self.transition(PresenterState::Draining);
                    self.transition(PresenterState::Stopped);
                    break;
                }
            }

            if self.stop.is_signalled() {
                self.transition(PresenterState::Draining);
            }
        }

        if self.state == PresenterState::Draining {
            self.drain();
            self.transition(PresenterState::Stopped);
        }

        PresenterReport {
            rendered: self.rendered,
            skipped: self.skipped,
            final_state: self.state,
        }
    }

    fn drain(&mut self) {
        while let Received::Fragment(envelope) = self.receiver.try_recv() {
            self.render(envelope.seq, &envelope.text);
        }
    }

    fn render(&mut self, seq: u64, text: &str) {
        self.skipped += seq.saturating_sub(self.next_seq);
        self.next_seq = seq + 1;
        (self.render)(text);
        self.rendered += 1;
    }

    fn transition(&mut self, next: PresenterState) {
        tracing::trace!(from = ?self.state, to = ?next, "presenter state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard};
    use std::thread;
    use std::time::Instant;

    use crate::delivery::{channel, SendOutcome};

    use super::*;

    const TICK: Duration = Duration::from_millis(5);

    #[test]
    fn stop_signal_is_raised_once() {
        let stop = StopSignal::new();

        assert!(!stop.is_signalled());
        assert!(stop.signal());
        assert!(!stop.signal());
        assert!(stop.is_signalled());
    }

    #[test]
    fn new_presenter_starts_idle() {
        let (_sender, receiver) = channel(1);
        let presenter = Presenter::new(receiver, StopSignal::new(), TICK, |_: &str| {});
        assert_eq!(presenter.state(), PresenterState::Idle);
    }

    #[test]
    fn closed_empty_channel_stops_without_stop_signal() {
        let (mut sender, receiver) = channel(4);
        sender.close();

        let report = Presenter::new(receiver, StopSignal::new(), Duration::from_secs(60), |_: &str| {})
            .run();

        assert_eq!(report.rendered, 0);
        assert_eq!(report.final_state, PresenterState::Stopped);
    }

    #[test]
    fn stop_drains_every_queued_fragment_in_order() {
        let (mut sender, receiver) = channel(8);
        for text in ["a", "b", "c"] {
            sender.try_send(text.to_string());
        }
        let stop = StopSignal::new();
        stop.signal();

        let mut seen = Vec::new();
        let report = Presenter::new(receiver, stop, TICK, |text: &str| seen.push(text.to_string()))
            .run();

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(report.rendered, 3);
        assert_eq!(report.final_state, PresenterState::Stopped);
    }

    #[test]
    fn skipped_counts_sequence_gaps() {
        let (mut sender, receiver) = channel(1);
        sender.try_send("0".to_string());
        sender.try_send("dropped".to_string());
        let stop = StopSignal::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let stop = stop.clone();
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                Presenter::new(receiver, stop, TICK, move |text: &str| {
                    lock(&seen).push(text.to_string());
                })
                .run()
            })
        };

        let deadline = Instant::now() + Duration::from_secs(2);
        while lock(&seen).is_empty() {
            assert!(Instant::now() < deadline, "first fragment should render");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(sender.try_send("2".to_string()), SendOutcome::Delivered);
        stop.signal();
        sender.close();

        let report = handle.join().expect("presenter thread joins");
        assert_eq!(*lock(&seen), vec!["0".to_string(), "2".to_string()]);
        assert_eq!(report.skipped, 1);
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
