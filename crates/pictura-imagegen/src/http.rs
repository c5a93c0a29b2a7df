use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pictura_core::{GenerationRecord, Options};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Generator,
    error::{Result, error_response},
    generator::{ProviderSummary, UsageStats},
};

const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;

/// Routes for generating images and managing generations
pub fn endpoint_router() -> Router<Generator> {
    Router::new()
        .route("/v1/images/generations", post(generate))
        .route("/v1/generations", get(history))
        .route("/v1/generations/{id}", get(show).delete(remove))
        .route("/v1/providers", get(providers))
        .route("/v1/stats", get(stats))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerateRequest {
    prompt: String,
    #[serde(default)]
    provider: Option<String>,
    /// Record a pending generation instead of calling the backend
    #[serde(default, rename = "async")]
    queue_only: bool,
    #[serde(default)]
    options: Options,
}

/// A record plus the fields derived from the blob store
#[derive(Debug, Serialize)]
struct RecordView {
    #[serde(flatten)]
    record: GenerationRecord,
    url: Option<String>,
    human_file_size: String,
}

impl RecordView {
    fn new(generator: &Generator, record: GenerationRecord) -> Self {
        Self {
            url: record.url(generator.blobs()),
            human_file_size: record.human_file_size(),
            record,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    data: Vec<RecordView>,
}

#[derive(Debug, Serialize)]
struct ProvidersResponse {
    default: String,
    data: Vec<ProviderSummary>,
}

async fn generate(State(generator): State<Generator>, Json(request): Json<GenerateRequest>) -> Result<Response> {
    let generator = match request.provider.as_deref() {
        Some(name) if generator.provider_config(name).is_none() => {
            return Ok(not_found(format!("Provider '{name}' not found")));
        }
        Some(name) => generator.provider(Some(name))?,
        None => generator,
    };

    tracing::debug!(provider = %generator.active_provider(), queue_only = request.queue_only, "generation handler called");

    let (status, record) = if request.queue_only {
        let record = generator.generate_async(&request.prompt, request.options).await?;
        (StatusCode::ACCEPTED, record)
    } else {
        let record = generator.generate(&request.prompt, request.options).await?;
        (StatusCode::OK, record)
    };

    Ok((status, Json(RecordView::new(&generator, record))).into_response())
}

async fn history(State(generator): State<Generator>, Query(query): Query<HistoryQuery>) -> Result<Json<HistoryResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);

    let data = generator
        .generation_history(limit)
        .await?
        .into_iter()
        .map(|record| RecordView::new(&generator, record))
        .collect();

    Ok(Json(HistoryResponse { data }))
}

async fn show(State(generator): State<Generator>, Path(id): Path<Uuid>) -> Result<Response> {
    Ok(match generator.find_generation(id).await? {
        Some(record) => Json(RecordView::new(&generator, record)).into_response(),
        None => generation_not_found(id),
    })
}

async fn remove(State(generator): State<Generator>, Path(id): Path<Uuid>) -> Result<Response> {
    Ok(if generator.delete_generation(id).await? {
        StatusCode::NO_CONTENT.into_response()
    } else {
        generation_not_found(id)
    })
}

async fn providers(State(generator): State<Generator>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        default: generator.default_provider().to_owned(),
        data: generator.provider_summaries(),
    })
}

async fn stats(State(generator): State<Generator>) -> Result<Json<UsageStats>> {
    Ok(Json(generator.usage_stats().await?))
}

fn generation_not_found(id: Uuid) -> Response {
    not_found(format!("Generation '{id}' not found"))
}

fn not_found(message: String) -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found_error", message)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, header},
    };
    use http_body_util::BodyExt;
    use pictura_config::{Config, DiskConfig, ProviderConfig, RateLimitConfig};
    use pictura_ratelimit::create_rate_limiter;
    use pictura_storage::{MemoryBlobStore, MemoryRecordStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn app(requests_per_minute: u32) -> Router {
        let mut config = Config::default();
        config.storage.disk = DiskConfig::Memory;
        config.rate_limiting = RateLimitConfig {
            requests_per_minute,
            ..RateLimitConfig::default()
        };

        let mut openai = ProviderConfig::new("openai");
        openai.api_key = Some("sk-proj-abcdefghijklmnopqrstuvwxyz0123456789ABCDEF".into());
        config.providers.insert("openai".to_owned(), openai);

        let limiter = create_rate_limiter(&config.rate_limiting).unwrap();
        let generator = Generator::new(
            config,
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryBlobStore::new()),
            limiter,
        );

        endpoint_router().with_state(generator)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Response) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn queued_generation_round_trips_through_the_api() {
        let app = app(5);

        let (status, response) = call(
            &app,
            "POST",
            "/v1/images/generations",
            Some(json!({ "prompt": "a paper boat", "async": true, "options": { "size": "1024x1792" } })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let created = json_body(response).await;
        assert_eq!(created["status"], "pending");
        assert_eq!(created["provider"], "openai");
        assert_eq!(created["human_file_size"], "Unknown");
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, response) = call(&app, "GET", &format!("/v1/generations/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["height"], 1792);

        let (_, response) = call(&app, "GET", "/v1/generations?limit=5", None).await;
        assert_eq!(json_body(response).await["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/v1/generations/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, response) = call(&app, "DELETE", &format!("/v1/generations/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["type"], "not_found_error");
    }

    #[tokio::test]
    async fn invalid_prompts_are_bad_requests() {
        let app = app(5);

        let (status, response) = call(&app, "POST", "/v1/images/generations", Some(json!({ "prompt": "  " }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], 400);
    }

    #[tokio::test]
    async fn rate_limited_requests_carry_retry_after() {
        let app = app(1);
        let body = json!({ "prompt": "a paper boat", "async": true });

        let (status, _) = call(&app, "POST", "/v1/images/generations", Some(body.clone())).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, response) = call(&app, "POST", "/v1/images/generations", Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        assert_eq!(json_body(response).await["error"]["type"], "rate_limit_error");
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let app = app(5);

        let (status, _) = call(
            &app,
            "POST",
            "/v1/images/generations",
            Some(json!({ "prompt": "a paper boat", "provider": "dreamer" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn providers_and_stats() {
        let app = app(5);

        let (status, response) = call(&app, "GET", "/v1/providers", None).await;
        assert_eq!(status, StatusCode::OK);
        let providers = json_body(response).await;
        assert_eq!(providers["default"], "openai");
        assert_eq!(providers["data"][0]["available"], true);

        let (status, response) = call(&app, "GET", "/v1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        let stats = json_body(response).await;
        assert_eq!(stats["total_generations"], 0);
        assert_eq!(stats["recent_activity"]["total"], 0);
    }

    #[tokio::test]
    async fn missing_generation_is_not_found() {
        let app = app(5);

        let (status, _) = call(&app, "GET", &format!("/v1/generations/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
