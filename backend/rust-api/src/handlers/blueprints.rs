use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::{questions::required_subject, ApiResult};
use crate::{
    extractors::AppJson,
    models::{
        blueprint::{CreateBlueprintRequest, UpdateBlueprintRequest},
        question::SubjectQuery,
    },
    services::AppState,
};

/// GET /api/blueprints/pool-metadata?subject= - Доступность вопросов по модулям и баллам
pub async fn pool_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = required_subject(&query)?;
    let availability = state.blueprint_service().availability(&subject).await?;
    Ok(Json(availability))
}

/// POST /api/blueprints - Создать шаблон
pub async fn create_blueprint(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateBlueprintRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let blueprint = state.blueprint_service().create(req).await?;
    Ok((StatusCode::CREATED, Json(blueprint)))
}

/// GET /api/blueprints
pub async fn list_blueprints(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let blueprints = state.blueprint_service().list().await?;
    Ok(Json(blueprints))
}

/// GET /api/blueprints/{id}
pub async fn get_blueprint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let blueprint = state.blueprint_service().get(&id).await?;
    Ok(Json(blueprint))
}

/// PUT /api/blueprints/{id} - Обновить шаблон
pub async fn update_blueprint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateBlueprintRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    tracing::info!(blueprint = %id, "Updating blueprint");
    let blueprint = state.blueprint_service().update(&id, req).await?;
    Ok(Json(blueprint))
}

/// POST /api/blueprints/{id}/validate - Проверить шаблон по текущему пулу
pub async fn validate_blueprint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state.blueprint_service().validate(&id).await?;
    Ok(Json(report))
}
