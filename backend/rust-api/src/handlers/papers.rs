use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::ApiResult;
use crate::{
    extractors::AppJson,
    models::{
        difficulty::DifficultyConfigsResponse,
        paper::{GeneratePapersRequest, LimitQuery},
    },
    services::{
        pdf_renderer::{pdf_filename, render_paper_pdf},
        xlsx_export::{render_paper_xlsx, xlsx_filename},
        AppState,
    },
};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// POST /api/papers/generate - Сгенерировать набор билетов по шаблону
pub async fn generate_papers(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<GeneratePapersRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.paper_service().generate(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/papers/recent?limit=
pub async fn recent_papers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let papers = state.paper_service().recent(query.limit).await?;
    Ok(Json(papers))
}

/// GET /api/papers/difficulty-configs
pub async fn difficulty_configs() -> impl IntoResponse {
    Json(DifficultyConfigsResponse::build())
}

/// GET /api/papers/difficulty/{level}?limit=
pub async fn papers_by_difficulty(
    State(state): State<Arc<AppState>>,
    Path(level): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let papers = state
        .paper_service()
        .by_difficulty(&level, query.limit)
        .await?;
    Ok(Json(papers))
}

/// GET /api/papers/blueprint/{blueprint_id}/papers
pub async fn papers_by_blueprint(
    State(state): State<Arc<AppState>>,
    Path(blueprint_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let grouped = state.paper_service().by_blueprint(&blueprint_id).await?;
    Ok(Json(grouped))
}

/// GET /api/papers/{id}
pub async fn get_paper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let paper = state.paper_service().get(&id).await?;
    Ok(Json(paper))
}

/// GET /api/papers/{id}/download-pdf - Выгрузка билета в PDF
pub async fn download_pdf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let paper = state.paper_service().get(&id).await?;
    let filename = pdf_filename(&paper);
    let institution = state.config.institution_name.clone();

    let bytes = tokio::task::spawn_blocking(move || render_paper_pdf(&paper, &institution))
        .await
        .context("PDF rendering task failed")?;

    tracing::info!(paper = %id, bytes = bytes.len(), "Rendered paper PDF");
    Ok(attachment(bytes, "application/pdf", &filename))
}

/// GET /api/papers/{id}/download-xlsx
pub async fn download_xlsx(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let paper = state.paper_service().get(&id).await?;
    let filename = xlsx_filename(&paper);

    let bytes = tokio::task::spawn_blocking(move || render_paper_xlsx(&paper))
        .await
        .context("XLSX export task failed")?
        .context("Failed to build XLSX export")?;

    Ok(attachment(bytes, XLSX_CONTENT_TYPE, &filename))
}

fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
