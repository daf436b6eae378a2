use serde_json::Value;

use crate::wire::GenerateContentResponse;

/// One decoded `data:` frame of a `streamGenerateContent` response.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Response(GenerateContentResponse),
    /// In-band `{"error": {..}}` payload.
    Error {
        status: Option<String>,
        message: String,
    },
    /// Raw payload that is not valid response JSON.
    Malformed(String),
}

/// Incremental parser for SSE text streams.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" {
                    continue;
                }
                events.push(map_event(payload));
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<SseEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(payload: String) -> SseEvent {
    let value = match serde_json::from_str::<Value>(&payload) {
        Ok(value) => value,
        Err(_) => return SseEvent::Malformed(payload),
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|value| value.as_str())
            .unwrap_or("unknown error")
            .to_owned();
        let status = error
            .get("status")
            .and_then(|value| value.as_str())
            .map(ToString::to_string);
        return SseEvent::Error { status, message };
    }

    match serde_json::from_value::<GenerateContentResponse>(value) {
        Ok(response) => SseEvent::Response(response),
        Err(_) => SseEvent::Malformed(payload),
    }
}
