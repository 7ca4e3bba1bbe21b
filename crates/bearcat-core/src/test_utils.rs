//! Test utilities for bearcat-core
//!
//! This module provides testing infrastructure: a mock chat-completions server
//! and a mock Firestore REST server, both bound to an ephemeral local port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tokio::sync::oneshot;

use crate::store::firestore::{Document, ListDocumentsResponse, Value};

/// Spawn an axum app on 127.0.0.1 with a shutdown channel
async fn serve(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

// ========== Chat completions ==========

/// How the mock completion server answers every request
#[derive(Debug, Clone)]
pub enum CompletionBehavior {
    /// 200 with one choice containing this text
    Reply(String),
    /// Error status with a JSON error body
    Status(u16),
    /// 200 with a body that is not JSON
    Malformed,
    /// 200 with an empty choice list
    NoChoices,
    /// 200 with `content: null`
    NullContent,
    /// Sleep, then reply
    Delay(Duration, String),
}

/// A request received by the mock completion server
#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    pub model: String,
    pub prompt: String,
    pub message_count: usize,
    pub authorization: Option<String>,
}

struct CompletionState {
    behavior: CompletionBehavior,
    requests: Mutex<Vec<RecordedCompletion>>,
}

/// Mock OpenAI-compatible server
pub struct MockCompletionServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<CompletionState>,
}

impl MockCompletionServer {
    /// Start the mock server on an available port
    pub async fn start(behavior: CompletionBehavior) -> Self {
        let state = Arc::new(CompletionState {
            behavior,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat_completion))
            .with_state(state.clone());

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedCompletion> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockCompletionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Models endpoint (health check)
async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "gpt-3.5-turbo", "object": "model"}]
    }))
}

fn completion_body(content: Option<&str>) -> serde_json::Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

async fn handle_chat_completion(
    State(state): State<Arc<CompletionState>>,
    headers: HeaderMap,
    Json(request): Json<serde_json::Value>,
) -> Response {
    let messages = request["messages"].as_array().cloned().unwrap_or_default();
    state.requests.lock().unwrap().push(RecordedCompletion {
        model: request["model"].as_str().unwrap_or_default().to_string(),
        prompt: messages
            .first()
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string(),
        message_count: messages.len(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    match &state.behavior {
        CompletionBehavior::Reply(text) => Json(completion_body(Some(text))).into_response(),
        CompletionBehavior::Status(code) => {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({"error": {"message": "mock failure", "type": "server_error"}})),
            )
                .into_response()
        }
        CompletionBehavior::Malformed => (StatusCode::OK, "<html>not json</html>").into_response(),
        CompletionBehavior::NoChoices => Json(json!({"choices": []})).into_response(),
        CompletionBehavior::NullContent => Json(completion_body(None)).into_response(),
        CompletionBehavior::Delay(delay, text) => {
            tokio::time::sleep(*delay).await;
            Json(completion_body(Some(text))).into_response()
        }
    }
}

// ========== Firestore ==========

struct FirestoreState {
    documents: Mutex<Vec<Document>>,
    page_size: usize,
    fail_writes: AtomicBool,
    next_id: AtomicU64,
    api_keys: Mutex<Vec<String>>,
}

/// Mock Firestore REST server (create and list documents)
pub struct MockFirestoreServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Arc<FirestoreState>,
}

impl MockFirestoreServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::with_page_size(100).await
    }

    /// Start with a small page size to exercise page tokens
    pub async fn with_page_size(page_size: usize) -> Self {
        let state = Arc::new(FirestoreState {
            documents: Mutex::new(Vec::new()),
            page_size: page_size.max(1),
            fail_writes: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            api_keys: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(
                "/v1/projects/:project/databases/:database/documents/:collection",
                get(handle_list_documents).post(handle_create_document),
            )
            .with_state(state.clone());

        let (addr, shutdown_tx) = serve(app).await;
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Reject every create request with 503
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store an expense document as another client would, without validation
    pub fn insert_unvalidated(&self, amount: f64, note: &str) {
        let id = format!("doc{:04}", self.state.next_id.fetch_add(1, Ordering::SeqCst));
        let mut fields = HashMap::new();
        fields.insert("amount".to_string(), Value::double(amount));
        fields.insert("note".to_string(), Value::string(note));
        let document = Document {
            name: Some(format!(
                "projects/demo/databases/(default)/documents/expenses/{}",
                id
            )),
            fields,
            create_time: Some(Utc::now()),
        };
        self.state.documents.lock().unwrap().push(document);
    }

    /// `key` query parameters received, one per request
    pub fn api_keys_seen(&self) -> Vec<String> {
        self.state.api_keys.lock().unwrap().clone()
    }

    /// Number of stored documents
    pub fn document_count(&self) -> usize {
        self.state.documents.lock().unwrap().len()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockFirestoreServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_api_key(state: &FirestoreState, query: &HashMap<String, String>) {
    if let Some(key) = query.get("key") {
        state.api_keys.lock().unwrap().push(key.clone());
    }
}

async fn handle_create_document(
    State(state): State<Arc<FirestoreState>>,
    Path((project, database, collection)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    Json(mut document): Json<Document>,
) -> Response {
    record_api_key(&state, &query);
    if state.fail_writes.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "backend unavailable").into_response();
    }

    let id = format!("doc{:04}", state.next_id.fetch_add(1, Ordering::SeqCst));
    document.name = Some(format!(
        "projects/{}/databases/{}/documents/{}/{}",
        project, database, collection, id
    ));
    document.create_time = Some(Utc::now());

    state.documents.lock().unwrap().push(document.clone());
    Json(document).into_response()
}

async fn handle_list_documents(
    State(state): State<Arc<FirestoreState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<ListDocumentsResponse> {
    record_api_key(&state, &query);

    let requested = query
        .get("pageSize")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(state.page_size);
    let page_size = requested.min(state.page_size).max(1);
    let offset = query
        .get("pageToken")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);

    let documents = state.documents.lock().unwrap();
    let page: Vec<Document> = documents.iter().skip(offset).take(page_size).cloned().collect();
    let end = offset + page.len();

    Json(ListDocumentsResponse {
        documents: page,
        next_page_token: (end < documents.len()).then(|| end.to_string()),
    })
}
