//! HTTP handlers for the stock ledger

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{PaginatedResponse, StockUpsert};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentActor;
use crate::services::stock::StockView;
use crate::AppState;

/// Query parameters for listing stock
#[derive(Debug, Deserialize, Validate)]
pub struct StockListQuery {
    pub page: Option<u32>,
    #[validate(range(min = 1))]
    pub size: Option<u32>,
}

/// Body of the administrative upsert
#[derive(Debug, Deserialize, Validate)]
pub struct UpsertStockRequest {
    pub product_id: i64,
    pub store_id: i64,
    #[validate(range(min = 0))]
    pub quantity: Option<i64>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i64>,
    #[validate(range(min = 0))]
    pub max_stock: Option<i64>,
}

/// Paged list of all entries
pub async fn list_stock(
    State(state): State<AppState>,
    Query(query): Query<StockListQuery>,
) -> AppResult<Json<PaginatedResponse<StockView>>> {
    query.validate()?;
    let page = state.stock().list(query.page, query.size).await?;
    Ok(Json(page))
}

/// Every store holding a product
pub async fn get_stock_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> AppResult<Json<Vec<StockView>>> {
    let entries = state.stock().by_product(product_id).await?;
    Ok(Json(entries))
}

/// One (product, store) entry, created empty if absent
pub async fn get_stock(
    State(state): State<AppState>,
    Path((product_id, store_id)): Path<(i64, i64)>,
) -> AppResult<Json<StockView>> {
    let entry = state.stock().get(product_id, store_id).await?;
    Ok(Json(entry))
}

/// Every product held by a store
pub async fn get_stock_by_store(
    State(state): State<AppState>,
    Path(store_id): Path<i64>,
) -> AppResult<Json<Vec<StockView>>> {
    let entries = state.stock().by_store(store_id).await?;
    Ok(Json(entries))
}

/// Create or overwrite an entry outside the document flow
pub async fn upsert_stock(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(request): Json<UpsertStockRequest>,
) -> AppResult<Json<StockView>> {
    request.validate()?;
    tracing::info!(
        "User {} adjusting stock of product {} at store {}",
        actor.0,
        request.product_id,
        request.store_id
    );
    let entry = state
        .stock()
        .create_or_update(StockUpsert {
            product_id: request.product_id,
            store_id: request.store_id,
            quantity: request.quantity,
            min_stock: request.min_stock,
            max_stock: request.max_stock,
        })
        .await?;
    Ok(Json(entry))
}
