//! Mock image generation backend for integration tests
//!
//! Serves a DALL-E style endpoint, a Stability text-to-image endpoint and the
//! image file the DALL-E endpoint links to.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use base64::Engine;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// PNG signature plus the start of an IHDR chunk
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];

pub const OPENAI_KEY: &str = "sk-proj-abcdefghijklmnopqrstuvwxyz0123456789ABCDEF";
pub const STABILITY_KEY: &str = "sk-stability-0123456789abcdefghijklmnop";

/// Mock backend returning canned images
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    addr: SocketAddr,
    openai_count: AtomicU32,
    stability_count: AtomicU32,
    download_count: AtomicU32,
    /// Status answered instead of an image (0 = succeed)
    fail_status: AtomicU16,
}

impl MockBackend {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            addr,
            openai_count: AtomicU32::new(0),
            stability_count: AtomicU32::new(0),
            download_count: AtomicU32::new(0),
            fail_status: AtomicU16::new(0),
        });

        let app = Router::new()
            .route("/v1/images/generations", routing::post(handle_openai))
            .route("/v1/generation/{engine}/text-to-image", routing::post(handle_stability))
            .route("/files/{name}", routing::get(handle_file))
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a provider
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Answer every generation request with this status and an error body
    pub fn fail_with(&self, status: u16) {
        self.state.fail_status.store(status, Ordering::Relaxed);
    }

    /// Number of DALL-E style generation requests received
    pub fn openai_count(&self) -> u32 {
        self.state.openai_count.load(Ordering::Relaxed)
    }

    /// Number of Stability generation requests received
    pub fn stability_count(&self) -> u32 {
        self.state.stability_count.load(Ordering::Relaxed)
    }

    /// Number of image file downloads served
    pub fn download_count(&self) -> u32 {
        self.state.download_count.load(Ordering::Relaxed)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn failure(state: &MockState) -> Option<Response> {
    let status = state.fail_status.load(Ordering::Relaxed);
    if status == 0 {
        return None;
    }

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": {
            "message": "Incorrect API key provided",
            "type": "invalid_request_error",
            "code": "invalid_api_key"
        }
    });

    Some((status, Json(body)).into_response())
}

async fn handle_openai(State(state): State<Arc<MockState>>, Json(request): Json<Value>) -> Response {
    state.openai_count.fetch_add(1, Ordering::Relaxed);

    if let Some(response) = failure(&state) {
        return response;
    }

    let prompt = request["prompt"].as_str().unwrap_or_default();

    let image = if request["response_format"] == "b64_json" {
        json!({ "b64_json": base64::engine::general_purpose::STANDARD.encode(PNG), "revised_prompt": format!("{prompt}, in watercolor") })
    } else {
        json!({ "url": format!("http://{}/files/generated.png", state.addr), "revised_prompt": format!("{prompt}, in watercolor") })
    };

    Json(json!({ "created": 1_700_000_000, "data": [image] })).into_response()
}

async fn handle_stability(
    State(state): State<Arc<MockState>>,
    Path(_engine): Path<String>,
    Json(_request): Json<Value>,
) -> Response {
    state.stability_count.fetch_add(1, Ordering::Relaxed);

    if let Some(response) = failure(&state) {
        return response;
    }

    Json(json!({
        "artifacts": [{
            "base64": base64::engine::general_purpose::STANDARD.encode(PNG),
            "seed": 42,
            "finishReason": "SUCCESS"
        }]
    }))
    .into_response()
}

async fn handle_file(State(state): State<Arc<MockState>>, Path(_name): Path<String>) -> Response {
    state.download_count.fetch_add(1, Ordering::Relaxed);

    ([(header::CONTENT_TYPE, "image/png")], PNG).into_response()
}
