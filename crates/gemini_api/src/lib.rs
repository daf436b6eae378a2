//! Transport-only Gemini API client primitives.
//!
//! This crate owns request building, response parsing and retry behavior for
//! the `generateContent`, `streamGenerateContent` and `models` endpoints. It
//! contains no conversation state and no terminal coupling.
//!
//! Streamed `data:` frames that fail to parse are surfaced as
//! [`SseEvent::Malformed`] so callers can fail the turn explicitly.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;
pub mod wire;

pub use client::GeminiApiClient;
pub use config::GeminiApiConfig;
pub use error::GeminiApiError;
pub use payload::GenerateContentRequest;
pub use sse::{SseEvent, SseStreamParser};
pub use url::{normalize_base_url, DEFAULT_GEMINI_BASE_URL};
pub use wire::{GenerateContentResponse, ModelInfo, WireCandidate, WireContent, WirePart};
