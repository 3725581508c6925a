//! Stock ledger service: quantity reads, movements and listings

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{PaginatedResponse, StockEntry, StockKey, StockUpsert, MAX_LINE_QUANTITY};

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::services::document::StoreInfo;
use crate::store::{LedgerStore, StoreRef};

/// Stock service over the ledger store
#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn LedgerStore>,
    ledger: LedgerConfig,
}

/// Stock entry with store display data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockView {
    pub id: i64,
    pub product_id: i64,
    pub store: StoreInfo,
    pub quantity: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub below_minimum: bool,
    pub updated_at: DateTime<Utc>,
}

impl StockView {
    fn new(entry: StockEntry, stores: &HashMap<i64, StoreRef>) -> Self {
        let below_minimum = entry.is_below_minimum();
        let store = stores.get(&entry.store_id);
        Self {
            id: entry.id,
            product_id: entry.product_id,
            store: StoreInfo {
                id: entry.store_id,
                code: store.map(|s| s.code.clone()),
                name: store.map(|s| s.name.clone()),
            },
            quantity: entry.quantity,
            min_stock: entry.min_stock,
            max_stock: entry.max_stock,
            below_minimum,
            updated_at: entry.updated_at,
        }
    }
}

fn ensure_positive(field: &str, value: i64) -> AppResult<()> {
    if value <= 0 {
        return Err(AppError::validation(field, format!("{} must be positive", field)));
    }
    Ok(())
}

/// Direct movements obey the same bound as document lines
fn ensure_movement(quantity: i64) -> AppResult<()> {
    ensure_positive("quantity", quantity)?;
    if quantity > MAX_LINE_QUANTITY {
        return Err(AppError::validation(
            "quantity",
            format!("quantity cannot exceed {}", MAX_LINE_QUANTITY),
        ));
    }
    Ok(())
}

fn ensure_not_negative(field: &str, value: Option<i64>) -> AppResult<()> {
    if value.is_some_and(|v| v < 0) {
        return Err(AppError::validation(field, format!("{} cannot be negative", field)));
    }
    Ok(())
}

impl StockService {
    pub fn new(store: Arc<dyn LedgerStore>, ledger: LedgerConfig) -> Self {
        Self { store, ledger }
    }

    /// Current entry; a missing one is created empty
    pub async fn get(&self, product_id: i64, store_id: i64) -> AppResult<StockView> {
        let entry = self
            .store
            .stock_entry(StockKey::new(product_id, store_id), self.ledger.read_defaults())
            .await?;
        self.single(entry).await
    }

    /// Add received goods outside of a document
    pub async fn apply_import(
        &self,
        product_id: i64,
        store_id: i64,
        quantity: i64,
    ) -> AppResult<StockView> {
        ensure_movement(quantity)?;
        let entry = self
            .store
            .apply_import(
                StockKey::new(product_id, store_id),
                quantity,
                self.ledger.import_defaults(),
            )
            .await?;
        tracing::info!(
            "Stock +{} for product {} at store {} (now {})",
            quantity,
            product_id,
            store_id,
            entry.quantity
        );
        self.single(entry).await
    }

    /// Remove issued goods outside of a document; never goes negative
    pub async fn apply_export(
        &self,
        product_id: i64,
        store_id: i64,
        quantity: i64,
    ) -> AppResult<StockView> {
        ensure_movement(quantity)?;
        let entry = self
            .store
            .apply_export(StockKey::new(product_id, store_id), quantity)
            .await?;
        tracing::info!(
            "Stock -{} for product {} at store {} (now {})",
            quantity,
            product_id,
            store_id,
            entry.quantity
        );
        self.single(entry).await
    }

    /// Administrative create-or-update
    pub async fn create_or_update(&self, upsert: StockUpsert) -> AppResult<StockView> {
        ensure_not_negative("quantity", upsert.quantity)?;
        ensure_not_negative("min_stock", upsert.min_stock)?;
        ensure_not_negative("max_stock", upsert.max_stock)?;

        let entry = self
            .store
            .upsert_stock(upsert, self.ledger.read_defaults())
            .await?;
        tracing::info!(
            "Stock for product {} at store {} set to {} (min {}, max {})",
            entry.product_id,
            entry.store_id,
            entry.quantity,
            entry.min_stock,
            entry.max_stock
        );
        self.single(entry).await
    }

    pub async fn list(
        &self,
        page: Option<u32>,
        size: Option<u32>,
    ) -> AppResult<PaginatedResponse<StockView>> {
        let pagination = self.ledger.pagination(page, size);
        let (entries, total) = self.store.stock_page(pagination).await?;
        let views = self.enrich(entries).await?;
        Ok(PaginatedResponse::new(views, pagination, total))
    }

    pub async fn by_product(&self, product_id: i64) -> AppResult<Vec<StockView>> {
        let entries = self.store.stock_by_product(product_id).await?;
        self.enrich(entries).await
    }

    pub async fn by_store(&self, store_id: i64) -> AppResult<Vec<StockView>> {
        let entries = self.store.stock_by_store(store_id).await?;
        self.enrich(entries).await
    }

    async fn single(&self, entry: StockEntry) -> AppResult<StockView> {
        let stores = self.store.stores_by_ids(&[entry.store_id]).await?;
        Ok(StockView::new(entry, &stores))
    }

    /// One store lookup for the whole listing
    async fn enrich(&self, entries: Vec<StockEntry>) -> AppResult<Vec<StockView>> {
        let store_ids: Vec<i64> = entries.iter().map(|e| e.store_id).collect();
        let stores = self.store.stores_by_ids(&store_ids).await?;
        Ok(entries
            .into_iter()
            .map(|entry| StockView::new(entry, &stores))
            .collect())
    }
}
