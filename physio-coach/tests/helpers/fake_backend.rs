//! In-process fake of the rehabilitation backend
//!
//! Serves canned responses per (method, path) on an ephemeral port and
//! records every request it receives.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One request as seen by the fake backend
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

#[derive(Clone)]
struct CannedResponse {
    status: u16,
    content_type: String,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct BackendState {
    routes: Arc<Mutex<HashMap<(String, String), CannedResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct FakeBackend {
    pub base_url: String,
    state: BackendState,
    task: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = BackendState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("fake backend address");

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            task,
        }
    }

    /// Answer `method path` with a JSON body
    pub fn respond_json(&self, method: &str, path: &str, status: u16, body: serde_json::Value) {
        self.respond(
            method,
            path,
            status,
            "application/json",
            serde_json::to_vec(&body).expect("serialize canned body"),
        );
    }

    /// Answer `method path` with raw bytes
    pub fn respond(&self, method: &str, path: &str, status: u16, content_type: &str, body: Vec<u8>) {
        self.state.routes.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            CannedResponse {
                status,
                content_type: content_type.to_string(),
                body,
            },
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests to `path`, in arrival order
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    State(state): State<BackendState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(header::HeaderName, String); 1], Vec<u8>) {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });

    let canned = state
        .routes
        .lock()
        .unwrap()
        .get(&(method.to_string(), path))
        .cloned();

    match canned {
        Some(canned) => (
            StatusCode::from_u16(canned.status).expect("valid status"),
            [(header::CONTENT_TYPE, canned.content_type)],
            canned.body,
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/json".to_string())],
            br#"{"error": "Not found"}"#.to_vec(),
        ),
    }
}
