use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::config::GeminiApiConfig;
use crate::error::{parse_error_message, GeminiApiError};
use crate::headers::build_headers;
use crate::payload::GenerateContentRequest;
use crate::retry::is_retryable_http_error;
use crate::retry::{retry_delay_ms, MAX_RETRIES};
use crate::sse::{SseEvent, SseStreamParser};
use crate::url::{generate_content_url, models_url, stream_generate_content_url};
use crate::wire::{GenerateContentResponse, ListModelsResponse, ModelInfo};

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const MODELS_PAGE_SIZE: &str = "100";

#[derive(Debug)]
pub struct GeminiApiClient {
    http: Client,
    config: GeminiApiConfig,
}

impl GeminiApiClient {
    pub fn new(config: GeminiApiConfig) -> Result<Self, GeminiApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(GeminiApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiApiConfig {
        &self.config
    }

    pub fn build_headers(&self, accept: &str) -> Result<HeaderMap, GeminiApiError> {
        let headers = build_headers(&self.config, accept)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| GeminiApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    GeminiApiError::InvalidHeader(format!("invalid value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_stream_request(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<RequestBuilder, GeminiApiError> {
        validate_model(model)?;
        let headers = self.build_headers("text/event-stream")?;
        Ok(self
            .http
            .post(stream_generate_content_url(&self.config.base_url, model))
            .headers(headers)
            .json(request))
    }

    pub fn build_generate_request(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<RequestBuilder, GeminiApiError> {
        validate_model(model)?;
        let headers = self.build_headers("application/json")?;
        Ok(self
            .http
            .post(generate_content_url(&self.config.base_url, model))
            .headers(headers)
            .json(request))
    }

    pub fn build_list_models_request(
        &self,
        page_token: Option<&str>,
    ) -> Result<RequestBuilder, GeminiApiError> {
        let headers = self.build_headers("application/json")?;
        let mut builder = self
            .http
            .get(models_url(&self.config.base_url))
            .headers(headers)
            .query(&[("pageSize", MODELS_PAGE_SIZE)]);
        if let Some(token) = page_token {
            builder = builder.query(&[("pageToken", token)]);
        }
        Ok(builder)
    }

    /// Sends the request built by `build`, retrying transient failures.
    pub async fn send_with_retry<B>(
        &self,
        build: B,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, GeminiApiError>
    where
        B: Fn() -> Result<RequestBuilder, GeminiApiError>,
    {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(GeminiApiError::Cancelled);
            }

            let response = build()?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(GeminiApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(GeminiApiError::Status(status, message));
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < MAX_RETRIES {
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(GeminiApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(GeminiApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Streams one reply, handing every decoded response frame to `on_response`.
    ///
    /// Returning `ControlFlow::Break` from the handler ends the stream early
    /// without error. Returns the number of frames handed over.
    pub async fn stream_generate_content<F>(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_response: F,
    ) -> Result<usize, GeminiApiError>
    where
        F: FnMut(GenerateContentResponse) -> ControlFlow<()>,
    {
        let response = self
            .send_with_retry(|| self.build_stream_request(model, request), cancellation)
            .await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut delivered = 0;

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(GeminiApiError::Cancelled);
            }
            let chunk = chunk.map_err(GeminiApiError::from)?;
            for event in parser.feed(&chunk) {
                let response = process_stream_event(event)?;
                delivered += 1;
                if on_response(response).is_break() {
                    return Ok(delivered);
                }
            }
        }

        if is_cancelled(cancellation) {
            return Err(GeminiApiError::Cancelled);
        }

        Ok(delivered)
    }

    /// Non-streaming `generateContent` call.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<GenerateContentResponse, GeminiApiError> {
        let response = self
            .send_with_retry(|| self.build_generate_request(model, request), cancellation)
            .await?;
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(GeminiApiError::from)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Lists every model, following `nextPageToken` until exhausted.
    pub async fn list_models(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<ModelInfo>, GeminiApiError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = self
                .send_with_retry(
                    || self.build_list_models_request(page_token.as_deref()),
                    cancellation,
                )
                .await?;
            let body = await_or_cancel(response.text(), cancellation)
                .await?
                .map_err(GeminiApiError::from)?;
            let page: ListModelsResponse = serde_json::from_str(&body)?;
            models.extend(page.models);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(models),
            }
        }
    }
}

fn validate_model(model: &str) -> Result<(), GeminiApiError> {
    if model.trim().is_empty() {
        return Err(GeminiApiError::MissingModel);
    }
    Ok(())
}

fn process_stream_event(event: SseEvent) -> Result<GenerateContentResponse, GeminiApiError> {
    match event {
        SseEvent::Response(response) => Ok(response),
        SseEvent::Error { status, message } => {
            Err(GeminiApiError::StreamFailed { status, message })
        }
        SseEvent::Malformed(payload) => Err(GeminiApiError::MalformedSse(payload)),
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, GeminiApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(GeminiApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(GeminiApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::process_stream_event;
    use crate::error::GeminiApiError;
    use crate::sse::SseStreamParser;

    #[test]
    fn process_stream_event_keeps_parser_order() {
        let frames = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"A\"}],\"role\":\"model\"}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"B\"}],\"role\":\"model\"}}]}\n\n",
        );
        let mut parser = SseStreamParser::default();

        let texts: Vec<String> = parser
            .feed(frames.as_bytes())
            .into_iter()
            .map(|event| {
                process_stream_event(event)
                    .expect("response frames should process successfully")
                    .text()
            })
            .collect();

        assert_eq!(texts, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn process_stream_event_fails_on_in_band_error() {
        let mut parser = SseStreamParser::default();
        let events = parser.feed(
            b"data: {\"error\":{\"code\":500,\"message\":\"internal\",\"status\":\"INTERNAL\"}}\n\n",
        );

        let error = process_stream_event(events[0].clone()).expect_err("error frame should fail");
        assert!(matches!(
            error,
            GeminiApiError::StreamFailed { status: Some(ref status), ref message }
                if status == "INTERNAL" && message == "internal"
        ));
    }

    #[test]
    fn process_stream_event_surfaces_malformed_payload() {
        let mut parser = SseStreamParser::default();
        let events = parser.feed(b"data: {broken\n\n");

        let error = process_stream_event(events[0].clone()).expect_err("malformed should fail");
        assert!(matches!(error, GeminiApiError::MalformedSse(ref raw) if raw == "{broken"));
    }
}
