//! Streaming turn coordination for a chat session.
//!
//! One turn pulls reply chunks from a [`chat_provider::ChatBackend`], keeps
//! the authoritative aggregated text, and hands each fragment to a dedicated
//! presenter thread through a bounded, drop-on-full channel so a slow render
//! callback never stalls the stream.

pub mod aggregator;
pub mod delivery;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod presenter;
pub mod session;

pub use delivery::DEFAULT_DELIVERY_CAPACITY;
pub use error::{SessionError, StreamResult, TurnError, TurnErrorKind};
pub use history::ConversationHistory;
pub use presenter::{PresenterReport, PresenterState, StopSignal, DEFAULT_PRESENTER_TICK};
pub use session::{Session, TurnOptions, DEFAULT_SYSTEM_INSTRUCTION};
