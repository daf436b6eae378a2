#![allow(dead_code)]

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_provider::CancelSignal;
use chat_provider_mock::MockBackend;
use chat_session::{Session, DEFAULT_SYSTEM_INSTRUCTION};

pub const FAST_TICK: Duration = Duration::from_millis(5);

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn session_with(backend: &Arc<MockBackend>) -> Session {
    Session::new(backend.clone(), DEFAULT_SYSTEM_INSTRUCTION).with_presenter_tick(FAST_TICK)
}

pub fn cancel_signal() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}

/// Collects every rendered fragment, optionally sleeping inside the callback
/// to simulate a slow terminal.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            seen: Arc::default(),
            delay,
        }
    }

    pub fn callback(&self) -> impl FnMut(&str) + Send + 'static {
        let seen = Arc::clone(&self.seen);
        let delay = self.delay;
        move |text: &str| {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            lock_unpoisoned(&seen).push(text.to_string());
        }
    }

    pub fn seen(&self) -> Vec<String> {
        lock_unpoisoned(&self.seen).clone()
    }
}
