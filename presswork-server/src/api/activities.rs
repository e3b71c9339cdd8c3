//! Activity endpoints
//!
//! - `POST /activities` register (intake)
//! - `GET /activities?department=&status=`
//! - `GET /activities/:id`
//! - `POST /activities/:id/complete | return | advance`

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use presswork_common::models::{Activity, ActivityFilter, NewActivity};
use serde::Deserialize;

use crate::{ApiResult, AppState};

/// Body of `POST /activities/:id/complete`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub completed_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `POST /activities/:id/return`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    #[serde(default)]
    pub returned_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `POST /activities/:id/advance`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[serde(default)]
    pub advanced_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /activities
pub async fn register_activity(
    State(state): State<AppState>,
    payload: Result<Json<NewActivity>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    let Json(new) = payload?;
    let activity = state.engine.register(new).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

/// GET /activities
pub async fn list_activities(
    State(state): State<AppState>,
    query: Result<Query<ActivityFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Activity>>> {
    let Query(filter) = query?;
    Ok(Json(state.engine.list(&filter).await?))
}

/// GET /activities/:id
pub async fn get_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> ApiResult<Json<Activity>> {
    Ok(Json(state.engine.get(&activity_id).await?))
}

/// POST /activities/:id/complete
pub async fn complete_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<Json<Activity>> {
    let Json(body) = payload?;
    let activity = state
        .engine
        .complete(&activity_id, &body.completed_by, body.notes)
        .await?;
    Ok(Json(activity))
}

/// POST /activities/:id/return
pub async fn return_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
    payload: Result<Json<ReturnRequest>, JsonRejection>,
) -> ApiResult<Json<Activity>> {
    let Json(body) = payload?;
    let activity = state
        .engine
        .return_activity(&activity_id, &body.returned_by, body.notes)
        .await?;
    Ok(Json(activity))
}

/// POST /activities/:id/advance
pub async fn advance_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
    payload: Result<Json<AdvanceRequest>, JsonRejection>,
) -> ApiResult<Json<Activity>> {
    let Json(body) = payload?;
    let activity = state
        .engine
        .advance(&activity_id, &body.advanced_by, body.notes)
        .await?;
    Ok(Json(activity))
}

/// Build activity routes
pub fn activity_routes() -> Router<AppState> {
    Router::new()
        .route("/activities", post(register_activity).get(list_activities))
        .route("/activities/:id", get(get_activity))
        .route("/activities/:id/complete", post(complete_activity))
        .route("/activities/:id/return", post(return_activity))
        .route("/activities/:id/advance", post(advance_activity))
}
