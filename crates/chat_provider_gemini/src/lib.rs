//! Gemini API-backed implementation of the shared `chat_provider` contract.
//!
//! The async `gemini_api` stream runs on a dedicated worker thread with its
//! own current-thread runtime. Decoded frames cross back through a bounded
//! channel so the session core can pull them as a blocking [`ChunkStream`].

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chat_provider::{
    BackendProfile, CancelSignal, Candidate, ChatBackend, ChunkStream, Content, Part,
    ProviderInitError, ResponseChunk, Role, SourceError, StreamRequest,
};
use gemini_api::{
    GeminiApiClient, GeminiApiConfig, GeminiApiError, GenerateContentRequest,
    GenerateContentResponse, ModelInfo, WireContent,
};

/// Stable provider identifier used for explicit startup selection.
pub const GEMINI_PROVIDER_ID: &str = "gemini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Frames buffered between the transport worker and the consumer.
const STREAM_BUFFER: usize = 16;
/// Upper bound for `generateContent` and model listing calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

type StreamItem = Result<ResponseChunk, SourceError>;

/// Runtime configuration for the Gemini provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    /// Deadline for non-streaming requests, which take no cancel signal.
    pub request_timeout: Duration,
}

impl GeminiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: None,
            timeout: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn into_api_config(self) -> GeminiApiConfig {
        let mut config = GeminiApiConfig::new(self.api_key);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

/// Blocking seam over the async transport, one call per request.
trait TransportClient: Send + Sync {
    fn stream(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        cancel: &CancelSignal,
        on_response: &mut dyn FnMut(GenerateContentResponse) -> ControlFlow<()>,
    ) -> Result<(), GeminiApiError>;

    fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiApiError>;

    fn list_models(&self) -> Result<Vec<ModelInfo>, GeminiApiError>;
}

#[derive(Debug)]
struct DefaultTransportClient {
    client: GeminiApiClient,
    request_timeout: Duration,
}

impl DefaultTransportClient {
    fn runtime() -> Result<tokio::runtime::Runtime, GeminiApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(GeminiApiError::Runtime)
    }

    fn block_on_with_deadline<T>(
        &self,
        request: impl std::future::Future<Output = Result<T, GeminiApiError>>,
    ) -> Result<T, GeminiApiError> {
        let after = self.request_timeout;
        Self::runtime()?.block_on(async move {
            tokio::time::timeout(after, request)
                .await
                .unwrap_or_else(|_| Err(GeminiApiError::TimedOut(after)))
        })
    }
}

impl TransportClient for DefaultTransportClient {
    fn stream(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        cancel: &CancelSignal,
        on_response: &mut dyn FnMut(GenerateContentResponse) -> ControlFlow<()>,
    ) -> Result<(), GeminiApiError> {
        let runtime = Self::runtime()?;
        runtime
            .block_on(
                self.client
                    .stream_generate_content(model, request, Some(cancel), on_response),
            )
            .map(|_| ())
    }

    fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiApiError> {
        self.block_on_with_deadline(self.client.generate_content(model, request, None))
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, GeminiApiError> {
        self.block_on_with_deadline(self.client.list_models(None))
    }
}

/// `ChatBackend` adapter backed by `gemini_api` transport primitives.
pub struct GeminiBackend {
    model: String,
    transport: Arc<dyn TransportClient>,
}

impl GeminiBackend {
    /// Creates a backend using real Gemini API transport.
    pub fn new(config: GeminiProviderConfig) -> Result<Self, ProviderInitError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderInitError::new(
                "Failed to initialize gemini provider: GEMINI_API_KEY is not set",
            ));
        }

        let model = sanitize_model(&config.model);
        let request_timeout = config.request_timeout;
        let transport = Arc::new(DefaultTransportClient {
            request_timeout,
            client: GeminiApiClient::new(config.into_api_config()).map_err(map_init_error)?,
        });

        Ok(Self { model, transport })
    }

    fn model_for(&self, req: &StreamRequest) -> String {
        req.model
            .as_deref()
            .map(sanitize_model)
            .unwrap_or_else(|| self.model.clone())
    }

    #[cfg(test)]
    fn with_transport_for_tests(model: &str, transport: Arc<dyn TransportClient>) -> Self {
        Self {
            model: sanitize_model(model),
            transport,
        }
    }
}

impl ChatBackend for GeminiBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            provider_id: GEMINI_PROVIDER_ID.to_string(),
            model_id: self.model.clone(),
        }
    }

    /// Blocks until the first frame, error or end of stream is known, so a
    /// request that fails before any frame surfaces here instead of mid-stream.
    ///
    /// The worker watches a stop flag owned by the returned stream. The stream
    /// raises it on drop or once it observes `cancel`.
    fn open_stream(
        &self,
        req: StreamRequest,
        cancel: CancelSignal,
    ) -> Result<ChunkStream, SourceError> {
        if cancel.load(Ordering::Acquire) {
            return Err(SourceError::cancelled());
        }

        let model = self.model_for(&req);
        let request = to_wire_request(&req);
        let (sender, receiver) = mpsc::sync_channel::<StreamItem>(STREAM_BUFFER);
        let transport = Arc::clone(&self.transport);
        let stop: CancelSignal = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        thread::Builder::new()
            .name("gemini-stream".to_string())
            .spawn(move || {
                run_stream_worker(transport.as_ref(), &model, &request, &worker_stop, sender)
            })
            .map_err(|error| {
                SourceError::new(format!("Failed to start gemini stream worker: {error}"))
            })?;

        let mut stream = GeminiChunkStream {
            first: None,
            receiver,
            cancel,
            stop,
            finished: false,
        };
        match stream.recv() {
            Some(Err(error)) => return Err(error),
            Some(Ok(chunk)) => stream.first = Some(chunk),
            None => stream.finished = true,
        }

        tracing::debug!(provider = GEMINI_PROVIDER_ID, "gemini stream opened");
        Ok(Box::new(stream))
    }

    fn send(&self, req: StreamRequest) -> Result<ResponseChunk, SourceError> {
        let model = self.model_for(&req);
        self.transport
            .generate(&model, &to_wire_request(&req))
            .map(to_response_chunk)
            .map_err(map_source_error)
    }

    fn list_models(&self) -> Result<Vec<String>, SourceError> {
        let models = self.transport.list_models().map_err(map_source_error)?;
        let chat_models: Vec<String> = models
            .iter()
            .filter(|model| model.supports("generateContent"))
            .map(|model| model.id().to_string())
            .collect();

        if chat_models.is_empty() {
            return Ok(models.iter().map(|model| model.id().to_string()).collect());
        }
        Ok(chat_models)
    }
}

fn run_stream_worker(
    transport: &dyn TransportClient,
    model: &str,
    request: &GenerateContentRequest,
    stop: &CancelSignal,
    sender: SyncSender<StreamItem>,
) {
    let result = transport.stream(model, request, stop, &mut |response| {
        match sender.send(Ok(to_response_chunk(response))) {
            Ok(()) => ControlFlow::Continue(()),
            // Consumer dropped the stream.
            Err(_) => ControlFlow::Break(()),
        }
    });

    match result {
        Err(error) if error.is_cancelled() => {
            tracing::debug!("gemini stream stopped");
            let _ = sender.send(Err(SourceError::cancelled()));
        }
        Err(error) => {
            tracing::warn!(%error, "gemini stream ended with error");
            let _ = sender.send(Err(map_source_error(error)));
        }
        Ok(()) => {}
    }
}

struct GeminiChunkStream {
    first: Option<ResponseChunk>,
    receiver: Receiver<StreamItem>,
    cancel: CancelSignal,
    stop: CancelSignal,
    finished: bool,
}

impl GeminiChunkStream {
    /// Waits for the next worker item, relaying the turn cancel flag to the
    /// worker while blocked. `None` means the worker is gone.
    fn recv(&self) -> Option<StreamItem> {
        loop {
            if self.cancel.load(Ordering::Acquire) {
                self.stop.store(true, Ordering::Release);
            }
            match self.receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for GeminiChunkStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Iterator for GeminiChunkStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(chunk) = self.first.take() {
            return Some(Ok(chunk));
        }
        if self.finished {
            return None;
        }

        match self.recv() {
            Some(item) => {
                if item.is_err() {
                    self.finished = true;
                }
                Some(item)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

fn to_wire_request(req: &StreamRequest) -> GenerateContentRequest {
    let contents = req
        .contents()
        .iter()
        .map(|content| WireContent {
            parts: content
                .parts
                .iter()
                .map(|part| gemini_api::WirePart::text(part.text.clone()))
                .collect(),
            role: Some(content.role.as_str().to_string()),
        })
        .collect();

    GenerateContentRequest::new(contents, req.system_instruction.clone())
}

fn to_response_chunk(response: GenerateContentResponse) -> ResponseChunk {
    ResponseChunk {
        candidates: response
            .candidates
            .into_iter()
            .map(|candidate| Candidate {
                content: candidate.content.map(from_wire_content),
                finish_reason: candidate.finish_reason,
            })
            .collect(),
    }
}

fn from_wire_content(content: WireContent) -> Content {
    let role = match content.role.as_deref() {
        Some("user") => Role::User,
        _ => Role::Model,
    };
    Content {
        parts: content
            .parts
            .into_iter()
            .map(|part| Part::text(part.text.unwrap_or_default()))
            .collect(),
        role,
    }
}

fn sanitize_model(model: &str) -> String {
    let model = model.trim();
    let model = model.strip_prefix("models/").unwrap_or(model);
    if model.is_empty() {
        DEFAULT_GEMINI_MODEL.to_string()
    } else {
        model.to_string()
    }
}

fn map_source_error(error: GeminiApiError) -> SourceError {
    if error.is_cancelled() {
        return SourceError::cancelled();
    }
    SourceError::new(format!("Gemini API request failed: {error}"))
}

fn map_init_error(error: GeminiApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize gemini provider: {error}"))
}
