use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use vizchat_core::dataset::{Dataset, DatasetStore};
use vizchat_core::gateway::LlmGateway;
use vizchat_core::pipeline::{ChartPipeline, PipelineOutcome};
use vizchat_core::relevance;

pub struct AppState {
    pub store: DatasetStore,
    pub gateway: Arc<dyn LlmGateway>,
    /// Root of the prebuilt web bundle served on unmatched routes.
    pub static_dir: PathBuf,
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct QueryRequest {
    prompt: String,
}

/// Query path: relevance gate, then the chart pipeline. Failures stay
/// HTTP-success with the message embedded in the payload; only upload
/// errors surface as HTTP status codes.
async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> Json<serde_json::Value> {
    // Capture the snapshot once; this request never observes a later upload.
    let Some(dataset) = state.store.snapshot().filter(|d| !d.is_empty()) else {
        return Json(serde_json::json!({ "response": relevance::NO_DATASET_MESSAGE }));
    };

    match relevance::check(state.gateway.as_ref(), &body.prompt, &dataset.columns).await {
        Ok(true) => {}
        Ok(false) => {
            return Json(serde_json::json!({
                "response": relevance::not_relevant_message(&body.prompt)
            }));
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "relevance check failed");
            return Json(serde_json::json!({
                "response": format!("Error querying the model: {e:#}")
            }));
        }
    }

    let pipeline = ChartPipeline::new(state.gateway.as_ref(), &dataset, &body.prompt);
    match pipeline.run().await {
        PipelineOutcome::Chart(payload) => Json(serde_json::json!({
            "chart": payload.chart,
            "response": payload.response,
        })),
        PipelineOutcome::Failed(msg) => Json(serde_json::json!({ "response": msg })),
    }
}

/// Upload path: the first file field is parsed as CSV and replaces the
/// stored dataset wholesale. Responds with the first column's name.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Error parsing multipart field: {e}"),
        )
    })? {
        if field.file_name().is_none() {
            continue;
        }
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read upload data: {e}"),
            )
        })?;

        let dataset = Dataset::from_csv(&data).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Error processing file: {e}"),
            )
        })?;

        let first_column = dataset.columns.first().cloned().unwrap_or_default();
        state.store.replace(dataset);
        tracing::info!(%first_column, "file received");

        return Ok(Json(serde_json::json!({
            "message": format!("File received, first_column_title: {first_column}"),
            "first_column": first_column,
        })));
    }
    Err((StatusCode::BAD_REQUEST, "no file field in upload".to_string()))
}

/// All other paths serve the prebuilt SPA bundle, falling back to the entry
/// document for client-side routes.
async fn serve_static(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let rel = uri.path().trim_start_matches('/');
    if !rel.is_empty() {
        let candidate = state.static_dir.join(rel);
        if is_path_within(&state.static_dir, &candidate) && candidate.is_file() {
            let mime = mime_guess::from_path(&candidate).first_or_text_plain();
            if let Ok(bytes) = tokio::fs::read(&candidate).await {
                return (
                    [(header::CONTENT_TYPE, mime.essence_str().to_string())],
                    bytes,
                )
                    .into_response();
            }
        }
    }
    match tokio::fs::read_to_string(state.static_dir.join("index.html")).await {
        Ok(html) => Html(html).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "web bundle not found").into_response(),
    }
}

fn is_path_within(base: &Path, candidate: &Path) -> bool {
    match candidate
        .canonicalize()
        .and_then(|p| base.canonicalize().map(|b| (b, p)))
    {
        Ok((b, p)) => p.starts_with(b),
        Err(_) => false,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route(
            "/uploadfile",
            post(upload_file).layer(DefaultBodyLimit::max(100 * 1024 * 1024)),
        )
        .fallback(get(serve_static))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
