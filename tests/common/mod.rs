//! In-process stand-in for the remote transform service.

use axum::{
    body::Body,
    extract::{multipart::Multipart, State},
    http::{StatusCode, Uri},
    response::Response,
    routing::post,
    Router,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use transform_client::client::delivery::{Deliverer, DirectorySink, ReleasePolicy};
use transform_client::client::{Notifier, TransformClient};
use transform_client::common::config::ServiceConfig;

/// What the mock service received in its most recent request.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub path: String,
    pub field: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub password: String,
}

/// Canned reply returned for every request.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockReply {
    pub fn artifact(body: &[u8], filename: Option<&str>) -> Self {
        let headers = filename
            .map(|name| {
                vec![(
                    "content-disposition".to_string(),
                    format!("attachment; filename=\"{}\"", name),
                )]
            })
            .unwrap_or_default();

        Self {
            status: 200,
            headers,
            body: body.to_vec(),
        }
    }

    pub fn error(status: u16, body: &[u8]) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_vec(),
        }
    }
}

struct MockState {
    hits: AtomicUsize,
    reply: Mutex<MockReply>,
    last: Mutex<Option<Upload>>,
    gate: Option<Semaphore>,
}

pub struct MockService {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockService {
    /// Start a service answering every request with `reply`.
    pub async fn start(reply: MockReply) -> Self {
        Self::spawn(reply, None).await
    }

    /// Start a service that holds each request until [`MockService::release`].
    pub async fn start_gated(reply: MockReply) -> Self {
        Self::spawn(reply, Some(Semaphore::new(0))).await
    }

    async fn spawn(reply: MockReply, gate: Option<Semaphore>) -> Self {
        let state = Arc::new(MockState {
            hits: AtomicUsize::new(0),
            reply: Mutex::new(reply),
            last: Mutex::new(None),
            gate,
        });

        let app = Router::new()
            .route("/encrypt", post(handle))
            .route("/decrypt", post(handle))
            .route("/roundtrip", post(handle))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_upload(&self) -> Option<Upload> {
        self.state.last.lock().unwrap().clone()
    }

    pub fn set_reply(&self, reply: MockReply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    /// Let one held request through.
    pub fn release(&self) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(1);
        }
    }

    /// Wait until at least `n` requests have arrived.
    pub async fn wait_for_hits(&self, n: usize) {
        for _ in 0..500 {
            if self.hits() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} requests, saw {}", n, self.hits());
    }

    pub fn service_config(&self, request_timeout_secs: u64) -> ServiceConfig {
        ServiceConfig {
            base_url: self.base_url.clone(),
            request_timeout_secs,
            ..ServiceConfig::default()
        }
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, mut multipart: Multipart) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut upload = Upload {
        path: uri.path().to_string(),
        ..Upload::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap_or_default();

        match name.as_str() {
            "file" | "content" => {
                upload.field = name;
                upload.file_name = file_name;
                upload.bytes = data.to_vec();
            }
            "password" => upload.password = String::from_utf8_lossy(&data).into_owned(),
            _ => {}
        }
    }
    *state.last.lock().unwrap() = Some(upload);

    if let Some(gate) = &state.gate {
        gate.acquire().await.unwrap().forget();
    }

    let reply = state.reply.lock().unwrap().clone();
    let mut builder = axum::http::Response::builder().status(StatusCode::from_u16(reply.status).unwrap());
    for (name, value) in reply.headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(reply.body)).unwrap()
}

/// Notifier that remembers every alert.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

/// Client saving into `dir`, with handles released on completion.
pub fn client_for(
    service: ServiceConfig,
    dir: &std::path::Path,
    notifier: Arc<RecordingNotifier>,
) -> TransformClient {
    let deliverer = Deliverer::new(Arc::new(DirectorySink::new(dir)), ReleasePolicy::OnCompletion);
    TransformClient::new(service, deliverer, notifier).unwrap()
}

pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
