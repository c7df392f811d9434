mod artifacts;
mod backboard;
mod campaign;
mod compare;
mod config;
mod http;
mod idempotency;
mod jobs;
mod manifesto;
mod metrics;
mod models;
mod pipeline;
mod shopify;
mod twelvelabs;
mod video;

use axum::{
    Json, Router,
    extract::{FromRequest, Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use eyre::{WrapErr, eyre};
use idempotency::IdempotencyStore;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    AnalyzeRequest, ApiError, CampaignRequest, CompareRequest, ManifestoRequest, PublishRequest,
    PublishResponse,
};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde::Serialize;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "brandcast.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    config::Credentials::from_env().log_missing();

    let pipeline = Pipeline::from_env()
        .await
        .map_err(|err| eyre!("pipeline setup failed: {err}"))?;
    let (queue, _worker) = jobs::JobQueue::spawn(pipeline.clone());
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| eyre!("prometheus recorder: {err}"))?;
    let state = AppState {
        pipeline,
        queue,
        openapi: Arc::new(load_openapi()),
        publishes: Arc::new(IdempotencyStore::from_env("publish")),
        prometheus_handle,
    };

    let port: u16 = config::env_parse("PORT").unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "brandcast.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app(state).into_make_service()).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let campaign = Router::new()
        .route("/draft", post(campaign_draft))
        .route("/publish", post(campaign_publish));

    let api = Router::new()
        .route("/manifesto", get(view_manifesto))
        .route("/manifesto/generate", post(generate_manifesto))
        .route("/manifesto/compare", post(compare_manifesto))
        .route("/twelvelabs/analyze", post(analyze_video))
        .route("/analyze", post(analyze_video))
        .route("/artifacts/{kind}", get(latest_artifact))
        .nest("/campaign", campaign.clone())
        .nest(
            "/jobs",
            Router::new()
                .route("/analyze", post(enqueue_analysis_job))
                .route("/{id}", get(get_job_status).delete(cancel_job)),
        );

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/api", api)
        .nest("/campaign", campaign)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env())),
        )
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    queue: jobs::JobQueue,
    openapi: Arc<Value>,
    publishes: Arc<IdempotencyStore>,
    prometheus_handle: PrometheusHandle,
}

fn load_openapi() -> Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "API is running" }))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Reports the manifesto lifecycle alongside the service name.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "brandcast-api-rs",
        "manifesto": state.pipeline.manifesto_status(),
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Brandcast API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

fn body_limit_from_env() -> usize {
    config::env_parse::<usize>("REQUEST_MAX_BYTES")
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = config::env_string("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

#[derive(Serialize)]
struct ManifestoResponse {
    status: &'static str,
    manifesto: String,
}

/// Return the stored manifesto or generate it from the store.
///
/// - Method: `POST`
/// - Path: `/api/manifesto/generate`
/// - Body: `{shop_domain, access_token}`
async fn generate_manifesto(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ManifestoRequest>,
) -> Result<Json<ManifestoResponse>, AppError> {
    crate::metrics::inc_requests("/api/manifesto/generate");
    info!(target = "brandcast.api", shop = %payload.shop_domain, "manifesto requested");
    let manifesto = state.pipeline.generate_manifesto(&payload).await?;
    Ok(Json(ManifestoResponse {
        status: "success",
        manifesto: manifesto.content,
    }))
}

async fn view_manifesto(State(state): State<AppState>) -> Result<Json<ManifestoResponse>, AppError> {
    crate::metrics::inc_requests("/api/manifesto");
    let manifesto = state
        .pipeline
        .view_manifesto()
        .await?
        .ok_or_else(|| PipelineError::not_found("view_manifesto", "No manifesto found."))?;
    Ok(Json(ManifestoResponse {
        status: "success",
        manifesto: manifesto.content,
    }))
}

/// Judge a video summary against the manifesto.
///
/// - Method: `POST`
/// - Path: `/api/manifesto/compare`
/// - Body: `{summary?}`; the latest analysis is used when `summary` is omitted
async fn compare_manifesto(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CompareRequest>,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/api/manifesto/compare");
    let result = state.pipeline.compare(payload.summary.as_deref()).await?;
    Ok(Json(json!({
        "status": "success",
        "comparison": result.comparison,
        "thread_id": result.thread_id,
    })))
}

/// Upload, index and analyze a video.
///
/// - Method: `POST`
/// - Path: `/api/analyze` (also `/api/twelvelabs/analyze`)
/// - Body: `{url, prompt?}`
/// - Response: `{status, data: {video_id, analysis, source, stages}}`
///
/// Dropping the connection cancels the indexing wait.
async fn analyze_video(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AnalyzeRequest>,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/api/analyze");
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    info!(target = "brandcast.api", url = %payload.url, "video analysis invoked");
    let result = state
        .pipeline
        .analyze(&payload.url, payload.prompt(), &cancel)
        .await?;
    Ok(Json(json!({ "status": "success", "data": result })))
}

/// Latest artifact of a kind (`analysis`, `comparison`, `campaign_draft`).
async fn latest_artifact(
    State(state): State<AppState>,
    Path(kind): Path<artifacts::ArtifactKind>,
) -> Result<Json<Value>, AppError> {
    let artifact = state
        .pipeline
        .latest_artifact(kind)
        .await
        .ok_or_else(|| PipelineError::not_found("artifacts", "nothing stored yet"))?;
    Ok(Json(json!({ "status": "success", "artifact": artifact })))
}

async fn campaign_draft(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CampaignRequest>,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/api/campaign/draft");
    let draft = state
        .pipeline
        .draft_campaign(
            payload.hit_video_summary.as_deref(),
            &payload.channels,
            payload.thread_id.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "status": "success", "draft": draft })))
}

/// Publish a campaign as a store marketing event.
///
/// - Method: `POST`
/// - Path: `/api/campaign/publish` (also `/campaign/publish`)
/// - Headers: optional `Idempotency-Key`; a repeated key replays the first
///   response without publishing again
async fn campaign_publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<PublishRequest>,
) -> Result<Json<PublishResponse>, AppError> {
    crate::metrics::inc_requests("/api/campaign/publish");
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(key) = &key {
        if let Some(existing) = state.publishes.get::<PublishResponse>(key).await {
            info!(target = "brandcast.api", idempotency_key = %key, "publish replayed");
            return Ok(Json(existing));
        }
    }

    let event = state
        .pipeline
        .publish_campaign(&payload.shop, &payload.campaign_data)
        .await?;
    let response = PublishResponse {
        status: "published".into(),
        shopify_event_id: event.id,
        shopify_event: event.raw,
    };
    if let Some(key) = &key {
        state.publishes.put(key, &response).await;
    }
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    status: &'static str,
    job_id: String,
}

async fn enqueue_analysis_job(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AnalyzeRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    crate::metrics::inc_requests("/api/jobs/analyze");
    if payload.url.trim().is_empty() {
        return Err(PipelineError::invalid_input("validate_request", "url is required").into());
    }
    let id = state.queue.enqueue_analysis(payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            status: "queued",
            job_id: id.to_string(),
        }),
    ))
}

fn parse_job_id(id: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(id)
        .map_err(|_| PipelineError::invalid_input("jobs", "invalid_job_id").into())
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let info = state
        .queue
        .get(parse_job_id(&id)?)
        .await
        .ok_or_else(|| PipelineError::not_found("jobs", "not_found"))?;
    Ok(Json(json!({ "status": "success", "job": info })))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let info = state
        .queue
        .cancel(parse_job_id(&id)?)
        .await
        .ok_or_else(|| PipelineError::not_found("jobs", "not_found"))?;
    Ok(Json(json!({ "status": "success", "job": info })))
}

/// `Json` body extractor whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct ApiJson<T>(T);

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Pipeline(PipelineError::invalid_input(
            "validate_request",
            rejection.body_text(),
        ))
    }
}

fn status_for(kind: PipelineErrorKind) -> StatusCode {
    match kind {
        PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        PipelineErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineErrorKind::Transport => StatusCode::BAD_GATEWAY,
        PipelineErrorKind::TerminalContent => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineErrorKind::Conflict => StatusCode::CONFLICT,
        PipelineErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        PipelineErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        PipelineErrorKind::NotFound => StatusCode::NOT_FOUND,
        PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = status_for(err.kind());
                if status.is_server_error() {
                    error!(target = "brandcast.api", stage = err.stage(), kind = err.kind().as_str(), "{}", err.detail());
                }
                let payload = ApiError::new(err.stage(), err.kind().as_str(), err.detail());
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
