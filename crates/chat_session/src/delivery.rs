//! Bounded hand-off between the aggregator and the presenter.
//!
//! Sending never blocks: when every slot is taken the fragment is dropped
//! from the presentation path. The aggregated text is unaffected.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;

pub const DEFAULT_DELIVERY_CAPACITY: usize = 100;

/// One fragment in flight. `seq` is the fragment's index in the turn, so gaps
/// reveal dropped fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub seq: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Channel full; the fragment was discarded.
    Dropped,
    /// Receiver gone or sender already closed.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Fragment(Envelope),
    /// Nothing queued yet.
    Empty,
    /// Closed and fully drained.
    Closed,
}

/// Creates a fresh channel holding at most `capacity` queued fragments.
///
/// A capacity of zero is raised to one; a rendezvous channel would drop
/// every fragment the presenter is not already waiting for.
pub fn channel(capacity: usize) -> (FragmentSender, FragmentReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (
        FragmentSender {
            tx: Some(tx),
            next_seq: 0,
            dropped: 0,
        },
        FragmentReceiver { rx },
    )
}

/// Producer half. Only the aggregator side holds it and only it closes.
#[derive(Debug)]
pub struct FragmentSender {
    tx: Option<SyncSender<Envelope>>,
    next_seq: u64,
    dropped: usize,
}

impl FragmentSender {
    pub fn try_send(&mut self, text: String) -> SendOutcome {
        let seq = self.next_seq;
        self.next_seq += 1;

        let Some(tx) = self.tx.as_ref() else {
            return SendOutcome::Closed;
        };
        match tx.try_send(Envelope { seq, text }) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                SendOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SendOutcome::Closed,
        }
    }

    /// Closes the channel. Returns `true` only for the call that closed it.
    pub fn close(&mut self) -> bool {
        self.tx.take().is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Fragments discarded because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Consumer half, owned by the presenter thread.
#[derive(Debug)]
pub struct FragmentReceiver {
    rx: Receiver<Envelope>,
}

impl FragmentReceiver {
    /// Waits at most `tick` for the next fragment.
    pub fn recv_timeout(&self, tick: Duration) -> Received {
        match self.rx.recv_timeout(tick) {
            Ok(envelope) => Received::Fragment(envelope),
            Err(RecvTimeoutError::Timeout) => Received::Empty,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    pub fn try_recv(&self) -> Received {
        match self.rx.try_recv() {
            Ok(envelope) => Received::Fragment(envelope),
            Err(TryRecvError::Empty) => Received::Empty,
            Err(TryRecvError::Disconnected) => Received::Closed,
        }
    }
}
