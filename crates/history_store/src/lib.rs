//! File-backed persistence for conversation histories.
//!
//! A history is stored wholesale as one pretty-printed JSON array of
//! role-tagged content entries, keyed by an opaque file name under a root
//! directory (by default `<config dir>/ai-chat/history`).

mod error;
mod paths;
mod store;

pub use error::HistoryStoreError;
pub use paths::{default_history_root, history_file_name, sanitize_file_name, HISTORY_DIR};
pub use store::HistoryStore;
