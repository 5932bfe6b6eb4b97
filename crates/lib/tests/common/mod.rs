//! Throwaway HTTP servers standing in for an OpenAI-compatible endpoint and an Ollama server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// A loopback port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn serve(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

/// OpenAI-compatible fake under `/v1`. Chat replies are popped from `replies`; when empty the
/// reply is a plain "ok". Every chat request body is recorded.
#[derive(Clone, Default)]
pub struct FakeOpenAi {
    pub replies: Arc<Mutex<VecDeque<Value>>>,
    pub requests: Arc<Mutex<Vec<Value>>>,
    /// `Authorization` header of every chat request.
    pub auth: Arc<Mutex<Vec<Option<String>>>>,
    /// Answer 400 "does not support tools" whenever a request carries tools.
    pub reject_tools: bool,
}

impl FakeOpenAi {
    pub fn reply(&self, message: Value) {
        self.replies
            .lock()
            .unwrap()
            .push_back(json!({ "choices": [{ "message": message }] }));
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.auth.lock().unwrap().clone()
    }

    /// Start the server; returns its base URL (`http://127.0.0.1:<port>/v1`).
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/v1/models", get(list_models))
            .route("/v1/chat/completions", post(chat))
            .with_state(self.clone());
        format!("http://127.0.0.1:{}/v1", serve(app).await)
    }
}

async fn list_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [
            { "id": "qwen2.5-7b-instruct", "object": "model" },
            { "id": "llama-3.1-8b-instruct", "object": "model" }
        ]
    }))
}

async fn chat(
    State(fake): State<FakeOpenAi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fake.auth.lock().unwrap().push(auth);
    let has_tools = body.get("tools").is_some();
    fake.requests.lock().unwrap().push(body);
    if fake.reject_tools && has_tools {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "this model does not support tools" } })),
        );
    }
    let next = fake.replies.lock().unwrap().pop_front();
    let reply = next.unwrap_or_else(|| {
        json!({ "choices": [{ "message": { "role": "assistant", "content": "ok" } }] })
    });
    (StatusCode::OK, Json(reply))
}

/// Ollama fake serving `/api/tags`; returns its port.
pub async fn start_ollama() -> u16 {
    let app = Router::new().route(
        "/api/tags",
        get(|| async {
            Json(json!({
                "models": [{
                    "name": "llama3.2:latest",
                    "size": 2019393189u64,
                    "details": { "family": "llama", "parameter_size": "3.2B" }
                }]
            }))
        }),
    );
    serve(app).await
}
