//! Shared helpers: a mock OpenAI-compatible server and log capture.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dmr_agent::logging::get_logger;
use serde_json::{Value, json};
use tracing_subscriber::layer::SubscriberExt;

pub const JOKE_STREAM: &str = concat!(
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Why did the pirate \"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"go to school? \"},\"finish_reason\":null}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"To improve his arrrticulation!\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":20,\"completion_tokens\":12,\"total_tokens\":32}}\n\n",
    "data: [DONE]\n\n",
);

pub const JOKE_TEXT: &str = "Why did the pirate go to school? To improve his arrrticulation!";

pub const BROKEN_STREAM: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Why\"}}]}\n\n",
    "data: {\"error\":{\"message\":\"model crashed\"}}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"never seen\"}}]}\n\n",
);

/// No `[DONE]`, and the last line has no newline.
pub const UNTERMINATED_STREAM: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Arr, \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"matey!\"},\"finish_reason\":\"stop\"}]}",
);

pub const BLOCKING_TEXT: &str = "Arr, that be a joke!";

/// How the mock endpoint misbehaves.
#[derive(Clone)]
pub struct MockBehavior {
    /// `GET /models` answers 503 this many times before succeeding.
    pub models_failures: u32,
    /// Non-streaming chat requests answer 500.
    pub fail_blocking: bool,
    /// Body for streaming chat requests.
    pub stream_body: &'static str,
    /// Model ids listed by `GET /models`.
    pub models: &'static [&'static str],
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            models_failures: 0,
            fail_blocking: false,
            stream_body: JOKE_STREAM,
            models: &["ai/smollm2:latest"],
        }
    }
}

pub struct MockState {
    behavior: MockBehavior,
    models_failures_left: AtomicU32,
    pub model_probes: AtomicU32,
    pub chat_requests: Mutex<Vec<Value>>,
}

impl MockState {
    pub fn probes(&self) -> u32 {
        self.model_probes.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Value> {
        self.chat_requests.lock().unwrap().clone()
    }
}

async fn models(State(state): State<Arc<MockState>>) -> Response {
    state.model_probes.fetch_add(1, Ordering::SeqCst);
    let left = state.models_failures_left.load(Ordering::SeqCst);
    if left > 0 {
        state.models_failures_left.store(left - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "model runner starting").into_response();
    }
    let data: Vec<Value> = state
        .behavior
        .models
        .iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "docker"}))
        .collect();
    Json(json!({"object": "list", "data": data})).into_response()
}

async fn chat(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.chat_requests.lock().unwrap().push(body.clone());

    if body["stream"].as_bool().unwrap_or(false) {
        return (
            [(header::CONTENT_TYPE, "text/event-stream")],
            state.behavior.stream_body,
        )
            .into_response();
    }

    if state.behavior.fail_blocking {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }

    Json(json!({
        "id": "c0",
        "object": "chat.completion",
        "model": "ai/smollm2",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": BLOCKING_TEXT},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 6, "total_tokens": 26}
    }))
    .into_response()
}

/// Spawn the mock on a random port. Returns its state and base URL.
pub async fn spawn_mock(behavior: MockBehavior) -> (Arc<MockState>, String) {
    let state = Arc::new(MockState {
        models_failures_left: AtomicU32::new(behavior.models_failures),
        behavior,
        model_probes: AtomicU32::new(0),
        chat_requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/v1/models", get(models))
        .route("/v1/chat/completions", post(chat))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, format!("http://{addr}/v1"))
}

/// A base URL nothing is listening on.
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1")
}

/// Routes this thread's tracing events to a fresh log file for the test.
pub struct LogCapture {
    _guard: tracing::subscriber::DefaultGuard,
    pub path: PathBuf,
    _dir: tempfile::TempDir,
}

impl LogCapture {
    /// `name` must be unique per test: loggers are process-wide.
    pub fn new(name: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Agent.log");
        let logger = get_logger(name, &path).unwrap();
        let guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(logger.layer()));
        Self {
            _guard: guard,
            path,
            _dir: dir,
        }
    }

    pub fn contents(&self) -> String {
        std::fs::read_to_string(&self.path).unwrap_or_default()
    }

    /// Number of lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}
