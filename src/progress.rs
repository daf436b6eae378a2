//! Per-turn progress line, plus the live status shown while a reply streams.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TurnProgress {
    started: Instant,
    chunks: usize,
    length: usize,
    elapsed: Duration,
}

impl TurnProgress {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            chunks: 0,
            length: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Records the aggregated totals and freezes the elapsed time.
    pub fn finish(&mut self, chunks: usize, length: usize) {
        self.chunks = chunks;
        self.length = length;
        self.elapsed = self.started.elapsed();
    }

    pub fn chunks_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.chunks as f64 / seconds
        } else {
            0.0
        }
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{}.{:03} s", elapsed.as_secs(), elapsed.subsec_millis())
}

impl fmt::Display for TurnProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunks: {} / Length: {} / Time: {} / Chunks/s: {:.1}",
            self.chunks,
            self.length,
            format_elapsed(self.elapsed),
            self.chunks_per_second()
        )
    }
}

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Rewrites the current terminal line in place.
pub const CLEAR_LINE: &str = "\r\x1b[2K";

/// Running counters for the reply that is still streaming.
#[derive(Debug, Clone)]
pub struct LiveProgress {
    started: Instant,
    chunks: usize,
    length: usize,
}

impl LiveProgress {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            chunks: 0,
            length: 0,
        }
    }

    /// Counts one rendered fragment and returns the refreshed status line.
    pub fn update(&mut self, fragment: &str) -> String {
        self.chunks += 1;
        self.length += fragment.len();
        self.status_line(self.started.elapsed())
    }

    fn status_line(&self, elapsed: Duration) -> String {
        let spinner = SPINNER[self.chunks % SPINNER.len()];
        format!(
            "{CLEAR_LINE}{spinner} Receiving... Chunks: {} / Length: {} / Time: {}",
            self.chunks,
            self.length,
            format_elapsed(elapsed)
        )
    }
}
