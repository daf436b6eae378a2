//! File logging so the terminal stays reserved for the conversation.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the filter from `AI_CHAT_LOG`, falling back to `info` when the
/// directive does not parse.
pub fn log_filter(directive: Option<&str>) -> EnvFilter {
    let directive = directive.unwrap_or(DEFAULT_LOG_FILTER);
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber, appending to `path`.
pub fn init_file_logging(path: &Path, directive: Option<&str>) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(log_filter(directive))
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)
}
