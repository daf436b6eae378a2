//! Terminal chat client for Gemini.
//!
//! The streaming turn machinery lives in `chat_session`; this crate wires it
//! to a line-oriented terminal: configuration, file logging, markdown
//! rendering, slash commands and the chat loop.

pub mod commands;
pub mod config;
pub mod interrupt;
pub mod logging;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod render;
pub mod repl;

pub use crate::commands::{parse_slash_command, SlashCommand};
pub use crate::config::{AppConfig, EnvConfig};
pub use crate::render::{format_user_text, prewarm_highlighting, DisplayStyle, MarkdownRenderer};
pub use crate::repl::Repl;
