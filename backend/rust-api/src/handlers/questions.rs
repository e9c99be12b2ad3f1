use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::{ApiError, ApiResult};
use crate::{
    error::AppError,
    extractors::AppJson,
    models::question::{SubjectQuery, UploadQuestionsRequest},
    services::AppState,
};

pub(crate) fn required_subject(query: &SubjectQuery) -> Result<String, ApiError> {
    query
        .trimmed()
        .ok_or_else(|| AppError::Validation("Subject is required".to_string()).into())
}

/// POST /api/upload - Импорт строк таблицы вопросов
pub async fn upload_questions(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<UploadQuestionsRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    tracing::info!(subject = %req.subject, rows = req.rows.len(), "Uploading questions");

    let response = state.import_service().import(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/questions/subjects
pub async fn list_subjects(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let subjects = state.question_service().subjects().await?;
    Ok(Json(json!({ "subjects": subjects })))
}

/// GET /api/questions/pool-metadata?subject=
pub async fn pool_metadata(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = required_subject(&query)?;
    let meta = state.question_service().pool_metadata(&subject).await?;
    Ok(Json(json!({ "subject": subject, "meta": meta })))
}

/// GET /api/questions/cos?subject=
pub async fn course_outcomes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = required_subject(&query)?;
    let cos = state.question_service().course_outcomes(&subject).await?;
    Ok(Json(json!({ "subject": subject, "cos": cos })))
}

/// GET /api/questions/rbt-levels?subject=
pub async fn rbt_levels(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = required_subject(&query)?;
    let levels = state.question_service().rbt_levels(&subject).await?;
    Ok(Json(json!({ "subject": subject, "rbt_levels": levels })))
}

/// GET /api/questions?subject=
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = query.trimmed();
    let questions = state.question_service().list(subject.as_deref()).await?;
    Ok(Json(questions))
}

/// GET /api/questions/stats?subject=
pub async fn question_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = query.trimmed();
    let stats = state.question_service().stats(subject.as_deref()).await?;
    Ok(Json(stats))
}
