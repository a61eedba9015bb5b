use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use distill_ingest::document;
use distill_pipeline::{Pipeline, PipelineConfig, PipelineError};

use crate::state::AppState;

type ApiError = (StatusCode, String);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.into())
}

/// Map pipeline failures onto HTTP statuses: caller mistakes are 400/422,
/// completion-service trouble is 502.
fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        PipelineError::ReduceBudgetExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::MapStage { .. } | PipelineError::ReduceStage { .. } => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// ── Health & config ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_configured: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        llm_configured: state.config.llm.is_configured(),
    })
}

pub async fn config_summary(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.config.redacted_summary())
}

// ── Summarization ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SummarizeResponse {
    pub filename: Option<String>,
    pub pages: usize,
    pub chunks: usize,
    pub map_calls: usize,
    pub reduce_calls: usize,
    pub collapse_levels: usize,
    pub summary: String,
}

#[derive(Deserialize)]
pub struct SummarizeTextRequest {
    pub text: String,
}

async fn run_pipeline(
    state: &AppState,
    text: &str,
    filename: Option<String>,
    pages: usize,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let config = PipelineConfig::from_config(&state.config)
        .map_err(|e| bad_request(format!("Pipeline configuration error: {e}")))?;
    let pipeline = Pipeline::new(state.provider.clone(), config);

    let result = pipeline
        .run(text)
        .await
        .map_err(|e| (pipeline_status(&e), format!("Summarization failed: {e}")))?;

    Ok(Json(SummarizeResponse {
        filename,
        pages,
        chunks: result.stats.chunks,
        map_calls: result.stats.map_calls,
        reduce_calls: result.stats.reduce_calls,
        collapse_levels: result.stats.collapse_levels,
        summary: result.summary,
    }))
}

/// Multipart upload: persist the file, extract text, run the pipeline.
pub async fn summarize_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {e}")))?
        .ok_or_else(|| bad_request("No file provided"))?;

    let filename = std::path::Path::new(field.file_name().unwrap_or("document.pdf"))
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| bad_request(format!("Failed to read file: {e}")))?;

    // Persist the upload under a unique folder before extraction.
    let upload_dir = state
        .config
        .storage
        .uploads_dir()
        .join(uuid::Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&upload_dir).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create upload dir: {e}"),
        )
    })?;
    let saved_path = upload_dir.join(&filename);
    tokio::fs::write(&saved_path, &bytes).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to persist upload: {e}"),
        )
    })?;
    info!(path = %saved_path.display(), size = bytes.len(), "upload persisted");

    let doc = document::extract_text(&bytes, &filename)
        .map_err(|e| bad_request(format!("Text extraction failed: {e}")))?;

    if doc.total_chars() == 0 {
        return Err(bad_request(format!(
            "Document '{}' contains no extractable text. \
             For PDFs, ensure the file contains a text layer (scanned/image PDFs are not supported).",
            filename
        )));
    }

    info!(
        "Extracted '{}' ({}): {} pages, {} chars",
        filename,
        doc.file_type,
        doc.pages.len(),
        doc.total_chars(),
    );

    run_pipeline(&state, &doc.full_text(), Some(filename), doc.pages.len()).await
}

/// Summarize raw text from a JSON body.
pub async fn summarize_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummarizeTextRequest>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    run_pipeline(&state, &req.text, None, 1).await
}
