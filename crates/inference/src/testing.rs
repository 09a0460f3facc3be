//! Scripted stand-in for the inference service.
//!
//! Binds an axum server to an ephemeral local port, answers each request with
//! the next queued [`FakeReply`] (HTTP 500 once the queue runs dry) and records
//! every request it receives.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{GatewayConfig, RetryConfig};

#[derive(Debug, Clone)]
pub enum FakeReply {
    /// 200 whose candidate text is this value serialized.
    Json(Value),
    /// 200 whose candidate text is this raw string.
    Text(String),
    /// 200 with this exact body instead of a generated envelope.
    Envelope(Value),
    /// Bare error status.
    Status(u16),
    /// Never answers in any reasonable time.
    Stall,
}

impl FakeReply {
    pub fn json(value: Value) -> Self {
        FakeReply::Json(value)
    }

    pub fn text(text: impl Into<String>) -> Self {
        FakeReply::Text(text.into())
    }

    pub fn envelope(body: Value) -> Self {
        FakeReply::Envelope(body)
    }

    pub fn status(code: u16) -> Self {
        FakeReply::Status(code)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub api_key: Option<String>,
    pub instruction: String,
    pub input: String,
    pub body: Value,
}

struct FakeState {
    replies: Mutex<VecDeque<FakeReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

pub struct FakeInferenceServer {
    base_url: String,
    state: Arc<FakeState>,
    task: JoinHandle<()>,
}

impl FakeInferenceServer {
    pub async fn start(replies: impl IntoIterator<Item = FakeReply>) -> Self {
        let state = Arc::new(FakeState {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake inference server");
        let addr = listener.local_addr().expect("fake inference server address");

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            task,
        }
    }

    /// Gateway settings pointing at this server, with millisecond backoff.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            endpoint: self.base_url.clone(),
            model: "gemini-test".to_string(),
            api_key: Some("test-key".to_string()),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
            },
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().expect("calls lock").len()
    }
}

impl Drop for FakeInferenceServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let text_at = |pointer: &str| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let call = RecordedCall {
        path: uri.path().to_string(),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        instruction: text_at("/systemInstruction/parts/0/text"),
        input: text_at("/contents/0/parts/0/text"),
        body: body.clone(),
    };
    state.calls.lock().expect("calls lock").push(call);

    let reply = state
        .replies
        .lock()
        .expect("replies lock")
        .pop_front()
        .unwrap_or(FakeReply::Status(500));

    match reply {
        FakeReply::Json(value) => Json(envelope(&value.to_string())).into_response(),
        FakeReply::Text(text) => Json(envelope(&text)).into_response(),
        FakeReply::Envelope(body) => Json(body).into_response(),
        FakeReply::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = json!({"error": {"code": code, "message": "scripted failure"}});
            (status, Json(body)).into_response()
        }
        FakeReply::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}

fn envelope(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}
