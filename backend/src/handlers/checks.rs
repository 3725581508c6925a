//! HTTP handlers for inventory checks

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{CheckInput, KeysetPage, PaginatedResponse};

use crate::error::AppResult;
use crate::handlers::documents::{KeysetQuery, RejectRequest, SearchQuery};
use crate::middleware::CurrentActor;
use crate::services::check::CheckView;
use crate::AppState;

pub async fn create_check(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(input): Json<CheckInput>,
) -> AppResult<(StatusCode, Json<CheckView>)> {
    let check = state.checks().create(input, actor.0).await?;
    Ok((StatusCode::CREATED, Json(check)))
}

/// Replace the counts of a PENDING check
pub async fn update_check(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<i64>,
    Json(input): Json<CheckInput>,
) -> AppResult<Json<CheckView>> {
    Ok(Json(state.checks().update(id, input, actor.0).await?))
}

pub async fn get_check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<CheckView>> {
    Ok(Json(state.checks().get(id).await?))
}

pub async fn search_checks(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<PaginatedResponse<CheckView>>> {
    let filter = query.filter()?;
    let page = state
        .checks()
        .search(&filter, query.page, query.size)
        .await?;
    Ok(Json(page))
}

pub async fn search_checks_keyset(
    State(state): State<AppState>,
    Query(query): Query<KeysetQuery>,
) -> AppResult<Json<KeysetPage<CheckView>>> {
    let filter = query.filter()?;
    let cursor = query.cursor()?;
    let page = state
        .checks()
        .search_keyset(&filter, cursor, query.size)
        .await?;
    Ok(Json(page))
}

pub async fn approve_check(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<i64>,
) -> AppResult<Json<CheckView>> {
    Ok(Json(state.checks().approve(id, actor.0).await?))
}

/// APPROVED -> ADJUSTED, moving stock by the counted differences
pub async fn confirm_check(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<i64>,
) -> AppResult<Json<CheckView>> {
    Ok(Json(state.checks().confirm(id, actor.0).await?))
}

pub async fn reject_check(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<CheckView>> {
    let reason = body.and_then(|Json(request)| request.reason);
    Ok(Json(state.checks().reject(id, actor.0, reason).await?))
}

/// PENDING -> CANCELLED
pub async fn cancel_check(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<i64>,
) -> AppResult<Json<CheckView>> {
    Ok(Json(state.checks().cancel(id, actor.0).await?))
}
