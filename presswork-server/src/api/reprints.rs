//! Reprint request endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use presswork_common::models::{NewReprintRequest, ReprintFilter, ReprintRequest, Resolution};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState};

/// Body of `POST /reprints/:id/process`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default)]
    pub processed_by: String,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

/// POST /reprints
pub async fn create_reprint(
    State(state): State<AppState>,
    payload: Result<Json<NewReprintRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReprintRequest>)> {
    let Json(new) = payload?;
    let request = state.reprints.create(new).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /reprints?toDepartment=&status=
pub async fn list_reprints(
    State(state): State<AppState>,
    query: Result<Query<ReprintFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<ReprintRequest>>> {
    let Query(filter) = query?;
    Ok(Json(state.reprints.list(&filter).await?))
}

/// GET /reprints/:id
pub async fn get_reprint(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ReprintRequest>> {
    let Path(request_id) = path?;
    Ok(Json(state.reprints.get(request_id).await?))
}

/// POST /reprints/:id/process
pub async fn process_reprint(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiResult<Json<ReprintRequest>> {
    let Path(request_id) = path?;
    let Json(body) = payload?;
    let resolution = body
        .resolution
        .ok_or_else(|| ApiError::BadRequest("resolution is required".to_string()))?;

    let request = state
        .reprints
        .process(request_id, &body.processed_by, resolution)
        .await?;
    Ok(Json(request))
}

/// Build reprint routes
pub fn reprint_routes() -> Router<AppState> {
    Router::new()
        .route("/reprints", post(create_reprint).get(list_reprints))
        .route("/reprints/:id", get(get_reprint))
        .route("/reprints/:id/process", post(process_reprint))
}
