use std::ops::ControlFlow;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use gemini_api::{
    GeminiApiClient, GeminiApiConfig, GeminiApiError, GenerateContentRequest, WireContent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

#[derive(Clone)]
struct ScriptedChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<ScriptedChunk>,
    },
    Reset,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(status: u16, frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "text/event-stream",
        chunks: vec![ScriptedChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        chunks: vec![ScriptedChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn text_frame(text: &str) -> String {
    format!(r#"{{"candidates":[{{"content":{{"parts":[{{"text":"{text}"}}],"role":"model"}}}}]}}"#)
}

fn request() -> GenerateContentRequest {
    GenerateContentRequest::new(vec![WireContent::new(Some("user"), "hi")], None)
}

fn client_for(server: &ScriptedServer) -> GeminiApiClient {
    let config = GeminiApiConfig::new("key").with_base_url(&server.base_url);
    GeminiApiClient::new(config).expect("client")
}

async fn collect_stream(
    client: &GeminiApiClient,
    cancellation: Option<&Arc<AtomicBool>>,
) -> Result<Vec<String>, GeminiApiError> {
    let mut texts = Vec::new();
    client
        .stream_generate_content("gemini-2.5-flash", &request(), cancellation, |response| {
            texts.push(response.text());
            ControlFlow::Continue(())
        })
        .await?;
    Ok(texts)
}

#[tokio::test]
async fn stream_integration_successful_completion() {
    let hello = text_frame("hello");
    let world = text_frame(" world");
    let server = ScriptedServer::new(vec![response_sse(200, &[hello.as_str(), world.as_str()])]).await;
    let client = client_for(&server);

    let texts = collect_stream(&client, None)
        .await
        .expect("stream should succeed");

    assert_eq!(texts, vec!["hello".to_string(), " world".to_string()]);
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_break_stops_early() {
    let a = text_frame("a");
    let b = text_frame("b");
    let server = ScriptedServer::new(vec![response_sse(200, &[a.as_str(), b.as_str()])]).await;
    let client = client_for(&server);

    let mut seen = Vec::new();
    let delivered = client
        .stream_generate_content("gemini-2.5-flash", &request(), None, |response| {
            seen.push(response.text());
            ControlFlow::Break(())
        })
        .await
        .expect("stream should end without error");

    assert_eq!(delivered, 1);
    assert_eq!(seen, vec!["a".to_string()]);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_in_band_error_fails_stream() {
    let ok = text_frame("partial");
    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            ok.as_str(),
            r##"{"error":{"code":500,"message":"boom","status":"INTERNAL"}}"##,
        ],
    )])
    .await;
    let client = client_for(&server);

    let error = collect_stream(&client, None)
        .await
        .expect_err("in-band error should fail");

    assert!(matches!(error, GeminiApiError::StreamFailed { .. }));
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_retryable_then_success() {
    let done = text_frame("done");
    let server = ScriptedServer::new(vec![
        response_json(
            503,
            r##"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"##,
        ),
        response_sse(200, &[done.as_str()]),
    ])
    .await;
    let client = client_for(&server);

    let texts = timeout(Duration::from_secs(12), collect_stream(&client, None))
        .await
        .expect("retry path should be bounded")
        .expect("stream should eventually succeed");

    assert_eq!(texts, vec!["done".to_string()]);
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_non_retryable_status_fails_explicitly() {
    let server = ScriptedServer::new(vec![response_json(
        400,
        r##"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"##,
    )])
    .await;
    let client = client_for(&server);

    let error = collect_stream(&client, None)
        .await
        .expect_err("stream should fail");
    assert!(
        matches!(error, GeminiApiError::Status(code, ref message)
            if code.as_u16() == 400 && message == "INVALID_ARGUMENT: API key not valid")
    );
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_cancellation_during_stream() {
    let first = text_frame("stream");
    let second = text_frame("late");
    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ScriptedChunk {
                delay_ms: 0,
                bytes: sse_frames(&[first.as_str()]),
            },
            ScriptedChunk {
                delay_ms: 400,
                bytes: sse_frames(&[second.as_str()]),
            },
        ],
    }])
    .await;
    let client = Arc::new(client_for(&server));

    let cancellation = Arc::new(AtomicBool::new(false));
    let stream_task = tokio::spawn({
        let client = Arc::clone(&client);
        let cancellation = Arc::clone(&cancellation);
        async move { collect_stream(&client, Some(&cancellation)).await }
    });

    sleep(Duration::from_millis(120)).await;
    cancellation.store(true, Ordering::Release);

    let error = timeout(Duration::from_secs(5), stream_task)
        .await
        .expect("stream task should resolve")
        .expect("join handle should resolve")
        .expect_err("cancellation should abort stream");

    assert!(error.is_cancelled());
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_connection_reset_then_retry_exhausted() {
    let server = ScriptedServer::new(vec![
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
    ])
    .await;
    let client = client_for(&server);

    let error = timeout(Duration::from_secs(20), collect_stream(&client, None))
        .await
        .expect("retry path should resolve")
        .expect_err("connection reset should surface as failure");

    assert!(matches!(
        error,
        GeminiApiError::RetryExhausted { status: None, .. }
    ));
    assert!(server.request_count() >= 4);

    server.shutdown();
}

#[tokio::test]
async fn generate_content_returns_whole_reply() {
    let body = text_frame("chat summary keywords");
    let server = ScriptedServer::new(vec![response_json(200, &body)]).await;
    let client = client_for(&server);

    let response = client
        .generate_content("gemini-2.5-flash", &request(), None)
        .await
        .expect("generate should succeed");

    assert_eq!(response.text(), "chat summary keywords");
    server.shutdown();
}

#[tokio::test]
async fn list_models_follows_page_tokens() {
    let server = ScriptedServer::new(vec![
        response_json(
            200,
            r##"{"models":[{"name":"models/gemini-2.5-flash","supportedGenerationMethods":["generateContent"]}],"nextPageToken":"p2"}"##,
        ),
        response_json(200, r##"{"models":[{"name":"models/embedding-001"}]}"##),
    ])
    .await;
    let client = client_for(&server);

    let models = client.list_models(None).await.expect("list should succeed");

    let ids: Vec<&str> = models.iter().map(|model| model.id()).collect();
    assert_eq!(ids, vec!["gemini-2.5-flash", "embedding-001"]);
    assert!(models[0].supports("generateContent"));
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
) {
    if read_request_headers(&mut socket).await.is_err() {
        return;
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r##"{"error":{"message":"unexpected request"}}"##));

    match response {
        ScriptedResponse::Reset => {}
        ScriptedResponse::Respond {
            status,
            content_type,
            chunks,
        } => {
            let headers = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                status_reason(status),
                content_type,
            );

            if socket.write_all(headers.as_bytes()).await.is_err() {
                return;
            }

            for chunk in chunks {
                if chunk.delay_ms > 0 {
                    sleep(Duration::from_millis(chunk.delay_ms)).await;
                }
                let prefix = format!("{:X}\r\n", chunk.bytes.len());
                if socket.write_all(prefix.as_bytes()).await.is_err() {
                    return;
                }
                if socket.write_all(&chunk.bytes).await.is_err() {
                    return;
                }
                if socket.write_all(b"\r\n").await.is_err() {
                    return;
                }
            }

            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
