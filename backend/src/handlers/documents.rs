//! HTTP handlers for import and export documents
//!
//! The same handlers serve both kinds; the router layers the kind in as an
//! `Extension`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::{DocumentFilter, DocumentInput, DocumentKind, DocumentStatus, KeysetCursor, KeysetPage, PaginatedResponse};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentActor;
use crate::services::document::DocumentView;
use crate::AppState;

/// Query parameters for offset search
#[derive(Debug, Deserialize, Validate)]
pub struct SearchQuery {
    pub status: Option<String>,
    #[validate(length(max = 100))]
    pub code: Option<String>,
    pub store_id: Option<i64>,
    pub order_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    #[validate(range(min = 1))]
    pub size: Option<u32>,
}

/// Query parameters for keyset search
#[derive(Debug, Deserialize, Validate)]
pub struct KeysetQuery {
    pub status: Option<String>,
    #[validate(length(max = 100))]
    pub code: Option<String>,
    pub store_id: Option<i64>,
    pub order_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Date of the last row of the previous page
    pub last_date: Option<DateTime<Utc>>,
    /// Id of the last row of the previous page
    pub last_id: Option<i64>,
    #[validate(range(min = 1))]
    pub size: Option<u32>,
}

impl SearchQuery {
    pub(crate) fn filter(&self) -> AppResult<DocumentFilter> {
        self.validate()?;
        build_filter(
            self.status.as_deref(),
            self.code.clone(),
            self.store_id,
            self.order_id,
            self.from,
            self.to,
        )
    }
}

impl KeysetQuery {
    pub(crate) fn filter(&self) -> AppResult<DocumentFilter> {
        self.validate()?;
        build_filter(
            self.status.as_deref(),
            self.code.clone(),
            self.store_id,
            self.order_id,
            self.from,
            self.to,
        )
    }

    pub(crate) fn cursor(&self) -> AppResult<Option<KeysetCursor>> {
        match (self.last_date, self.last_id) {
            (Some(date), Some(id)) => Ok(Some(KeysetCursor::new(date, id))),
            (None, None) => Ok(None),
            _ => Err(AppError::validation(
                "last_id",
                "last_date and last_id must be given together",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

fn build_filter(
    status: Option<&str>,
    code: Option<String>,
    store_id: Option<i64>,
    order_id: Option<i64>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<DocumentFilter> {
    let status = status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<DocumentStatus>())
        .transpose()
        .map_err(|e| AppError::validation("status", e))?;

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::validation("from", "from must not be after to"));
        }
    }

    Ok(DocumentFilter {
        status,
        code,
        store_id,
        order_id,
        from,
        to,
    })
}

/// Create a document
pub async fn create_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    actor: CurrentActor,
    Json(input): Json<DocumentInput>,
) -> AppResult<(StatusCode, Json<DocumentView>)> {
    let document = state.documents().create(kind, input, actor.0).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Replace a PENDING document
pub async fn update_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    actor: CurrentActor,
    Path(id): Path<i64>,
    Json(input): Json<DocumentInput>,
) -> AppResult<Json<DocumentView>> {
    let document = state.documents().update(kind, id, input, actor.0).await?;
    Ok(Json(document))
}

/// Get a document by id
pub async fn get_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    Path(id): Path<i64>,
) -> AppResult<Json<DocumentView>> {
    let document = state.documents().get(kind, id).await?;
    Ok(Json(document))
}

/// Offset-paginated search
pub async fn search_documents(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<PaginatedResponse<DocumentView>>> {
    let filter = query.filter()?;
    let page = state
        .documents()
        .search(kind, &filter, query.page, query.size)
        .await?;
    Ok(Json(page))
}

/// Keyset-paginated search
pub async fn search_documents_keyset(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    Query(query): Query<KeysetQuery>,
) -> AppResult<Json<KeysetPage<DocumentView>>> {
    let filter = query.filter()?;
    let cursor = query.cursor()?;
    let page = state
        .documents()
        .search_keyset(kind, &filter, cursor, query.size)
        .await?;
    Ok(Json(page))
}

/// PENDING -> APPROVED
pub async fn approve_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    actor: CurrentActor,
    Path(id): Path<i64>,
) -> AppResult<Json<DocumentView>> {
    let document = state.documents().approve(kind, id, actor.0).await?;
    Ok(Json(document))
}

/// APPROVED -> IMPORTED / EXPORTED, applying the stock movement
pub async fn confirm_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    actor: CurrentActor,
    Path(id): Path<i64>,
) -> AppResult<Json<DocumentView>> {
    let document = state.documents().confirm(kind, id, actor.0).await?;
    Ok(Json(document))
}

/// PENDING -> REJECTED
pub async fn reject_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    actor: CurrentActor,
    Path(id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<DocumentView>> {
    let reason = body.and_then(|Json(request)| request.reason);
    let document = state.documents().reject(kind, id, actor.0, reason).await?;
    Ok(Json(document))
}

/// PENDING -> CANCELLED
pub async fn cancel_document(
    State(state): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    actor: CurrentActor,
    Path(id): Path<i64>,
) -> AppResult<Json<DocumentView>> {
    let document = state.documents().cancel(kind, id, actor.0).await?;
    Ok(Json(document))
}
