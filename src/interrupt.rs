//! Ctrl-C routing.
//!
//! Outside a turn the flag stays raised, which arms the conditional shutdown
//! hook: SIGINT exits the process. A turn lowers it so the first SIGINT only
//! cancels that turn; a second one exits.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_provider::CancelSignal;
use signal_hook::consts::SIGINT;

/// Exit status used when Ctrl-C terminates the client.
pub const INTERRUPTED_EXIT_STATUS: i32 = 130;

#[derive(Debug)]
pub struct Interrupt {
    flag: CancelSignal,
}

impl Interrupt {
    /// Registers the SIGINT hooks. The shutdown hook is registered first so
    /// it sees the flag as it was before this signal raised it.
    pub fn install() -> io::Result<Self> {
        let interrupt = Self::unregistered();
        signal_hook::flag::register_conditional_shutdown(
            SIGINT,
            INTERRUPTED_EXIT_STATUS,
            Arc::clone(&interrupt.flag),
        )?;
        signal_hook::flag::register(SIGINT, Arc::clone(&interrupt.flag))?;
        Ok(interrupt)
    }

    fn unregistered() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Disarms the exit hook and returns the signal the turn should watch.
    pub fn begin_turn(&self) -> CancelSignal {
        self.flag.store(false, Ordering::Release);
        Arc::clone(&self.flag)
    }

    pub fn end_turn(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True while SIGINT would exit the process.
    pub fn exits_on_signal(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
