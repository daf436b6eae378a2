use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum GeminiApiError {
    MissingApiKey,
    MissingModel,
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedSse(String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        status: Option<String>,
        message: String,
    },
    Cancelled,
    TimedOut(std::time::Duration),
    Runtime(std::io::Error),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
    pub status: Option<String>,
}

impl ErrorPayloadFields {
    pub fn message_with_status(&self) -> Option<String> {
        let message = self.message.as_deref().and_then(non_empty_string)?;
        match self.status.as_deref().and_then(non_empty_string) {
            Some(status) => Some(format!("{status}: {message}")),
            None => Some(message.to_owned()),
        }
    }
}

impl fmt::Display for GeminiApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "API key is required"),
            Self::MissingModel => write!(f, "model name is required"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedSse(message) => write!(f, "malformed SSE event: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::StreamFailed { status, message } => match status {
                Some(status) if !status.trim().is_empty() => {
                    write!(f, "stream failed ({status}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::TimedOut(after) => write!(f, "request timed out after {after:?}"),
            Self::Runtime(error) => write!(f, "failed to initialize async runtime: {error}"),
        }
    }
}

impl std::error::Error for GeminiApiError {}

impl From<reqwest::Error> for GeminiApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for GeminiApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl GeminiApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Extract a human readable message from a Gemini error body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = parsed
            .value
            .as_ref()
            .and_then(ErrorPayloadFields::message_with_status)
        {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
