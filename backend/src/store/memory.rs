use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    batch_totals, find_shortfall, planned_quantities, signed_movements, CheckLine,
    DocumentAction, DocumentFilter, DocumentHeader, DocumentKind, DocumentLine, DocumentStatus,
    KeysetCursor, Pagination, QuantityOverflow, StockEntry, StockKey, StockShortfall,
    StockThresholds, StockUpsert,
};

use super::{
    apply_draft, distinct_ids, document_not_found, ensure_status_only, stamp_transition, DocumentDraft,
    DraftLines, LedgerStore, StoreRef,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct MemoryState {
    last_document_id: i64,
    last_line_id: i64,
    last_stock_id: i64,
    documents: BTreeMap<i64, DocumentHeader>,
    lines: BTreeMap<i64, Vec<DocumentLine>>,
    check_lines: BTreeMap<i64, Vec<CheckLine>>,
    stock: BTreeMap<StockKey, StockEntry>,
    stores: HashMap<i64, StoreRef>,
}

impl MemoryState {
    fn document_mut(&mut self, kind: DocumentKind, id: i64) -> AppResult<&mut DocumentHeader> {
        self.documents
            .get_mut(&id)
            .filter(|h| h.kind == kind)
            .ok_or_else(|| document_not_found(kind, id))
    }

    fn next_line_id(&mut self) -> i64 {
        self.last_line_id += 1;
        self.last_line_id
    }

    fn replace_lines(&mut self, document_id: i64, draft: &DocumentDraft) {
        self.lines.remove(&document_id);
        self.check_lines.remove(&document_id);

        match &draft.lines {
            DraftLines::Priced(new_lines) => {
                let lines = new_lines
                    .iter()
                    .map(|line| DocumentLine {
                        id: self.next_line_id(),
                        document_id,
                        product_id: line.product_id,
                        store_id: line.store_id,
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                        discount_percent: line.discount_percent,
                    })
                    .collect();
                self.lines.insert(document_id, lines);
            }
            DraftLines::Counted(new_lines) => {
                let lines = new_lines
                    .iter()
                    .map(|line| CheckLine {
                        id: self.next_line_id(),
                        document_id,
                        product_id: line.product_id,
                        store_id: line.store_id,
                        system_quantity: line.system_quantity,
                        actual_quantity: line.actual_quantity,
                        unit_price: line.unit_price,
                        note: line.note.clone(),
                    })
                    .collect();
                self.check_lines.insert(document_id, lines);
            }
        }
    }

    fn stock_or_create(
        &mut self,
        key: StockKey,
        defaults: StockThresholds,
        at: DateTime<Utc>,
    ) -> &mut StockEntry {
        let last_stock_id = &mut self.last_stock_id;
        self.stock.entry(key).or_insert_with(|| {
            *last_stock_id += 1;
            StockEntry {
                id: *last_stock_id,
                product_id: key.product_id,
                store_id: key.store_id,
                quantity: 0,
                min_stock: defaults.min_stock,
                max_stock: defaults.max_stock,
                updated_at: at,
            }
        })
    }

    fn available(&self, key: &StockKey) -> i64 {
        self.stock.get(key).map(|e| e.quantity).unwrap_or(0)
    }

    /// Matching headers in (date DESC, id DESC) order
    fn matching(&self, kind: DocumentKind, filter: &DocumentFilter) -> Vec<&DocumentHeader> {
        let mut headers: Vec<&DocumentHeader> = self
            .documents
            .values()
            .filter(|h| h.kind == kind && filter.matches(h))
            .collect();
        headers.sort_by(|a, b| {
            b.document_date
                .cmp(&a.document_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        headers
    }
}

/// In-memory document and stock store.
///
/// Intended for tests/dev. Every operation runs under one mutex, so
/// transitions are serialized and trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a warehouse known for display enrichment
    pub fn register_store(&self, store: StoreRef) -> AppResult<()> {
        self.state()?.stores.insert(store.id, store);
        Ok(())
    }

    fn state(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("ledger state lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> AppResult<()> {
        self.state().map(|_| ())
    }

    async fn insert_document(
        &self,
        draft: DocumentDraft,
        actor_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DocumentHeader> {
        let mut state = self.state()?;
        state.last_document_id += 1;
        let id = state.last_document_id;

        let header = DocumentHeader {
            id,
            kind: draft.kind,
            code: draft.code.clone(),
            status: DocumentStatus::Pending,
            document_date: at,
            store_id: draft.store_id,
            counterparty_id: draft.counterparty_id,
            counterparty: draft.counterparty.clone(),
            order_id: draft.order_id,
            note: draft.note.clone(),
            description: draft.description.clone(),
            attachments: draft.attachments.clone(),
            created_by: actor_id,
            created_at: at,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            cancelled_by: None,
            cancelled_at: None,
            completed_by: None,
            completed_at: None,
            updated_at: at,
        };

        state.replace_lines(id, &draft);
        state.documents.insert(id, header.clone());
        Ok(header)
    }

    async fn replace_document(
        &self,
        id: i64,
        draft: DocumentDraft,
        at: DateTime<Utc>,
    ) -> AppResult<DocumentHeader> {
        let mut state = self.state()?;
        let header = state.document_mut(draft.kind, id)?;
        let created_by = header.created_by;
        stamp_transition(header, DocumentAction::Edit, created_by, at, None)?;
        apply_draft(header, &draft);
        let header = header.clone();

        state.replace_lines(id, &draft);
        Ok(header)
    }

    async fn find_document(
        &self,
        kind: DocumentKind,
        id: i64,
    ) -> AppResult<Option<DocumentHeader>> {
        let state = self.state()?;
        Ok(state
            .documents
            .get(&id)
            .filter(|h| h.kind == kind)
            .cloned())
    }

    async fn transition_document(
        &self,
        kind: DocumentKind,
        id: i64,
        action: DocumentAction,
        actor_id: i64,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> AppResult<DocumentHeader> {
        ensure_status_only(action)?;
        let mut state = self.state()?;
        let header = state.document_mut(kind, id)?;
        stamp_transition(header, action, actor_id, at, reason)?;
        Ok(header.clone())
    }

    async fn confirm_document(
        &self,
        kind: DocumentKind,
        id: i64,
        actor_id: i64,
        at: DateTime<Utc>,
        import_defaults: StockThresholds,
    ) -> AppResult<DocumentHeader> {
        let mut state = self.state()?;

        // Work on a copy so a failed check leaves the stored header untouched
        let mut header = state.document_mut(kind, id)?.clone();
        stamp_transition(&mut header, DocumentAction::Confirm, actor_id, at, None)?;

        let deltas = signed_movements(
            kind,
            state.lines.get(&id).map(Vec::as_slice).unwrap_or_default(),
            state.check_lines.get(&id).map(Vec::as_slice).unwrap_or_default(),
        )?;

        // Validate every key before the first write
        if let Some(shortfall) = find_shortfall(&deltas, |key| state.available(key)) {
            return Err(AppError::InsufficientStock(shortfall));
        }
        let planned = planned_quantities(&deltas, |key| state.available(key))?;

        for (key, quantity) in planned {
            let entry = state.stock_or_create(key, import_defaults, at);
            entry.quantity = quantity;
            entry.updated_at = at;
        }

        state.documents.insert(id, header.clone());
        Ok(header)
    }

    async fn lines_for(&self, document_ids: &[i64]) -> AppResult<Vec<DocumentLine>> {
        let state = self.state()?;
        Ok(distinct_ids(document_ids.iter().copied())
            .iter()
            .filter_map(|id| state.lines.get(id))
            .flatten()
            .cloned()
            .collect())
    }

    async fn check_lines_for(&self, document_ids: &[i64]) -> AppResult<Vec<CheckLine>> {
        let state = self.state()?;
        Ok(distinct_ids(document_ids.iter().copied())
            .iter()
            .filter_map(|id| state.check_lines.get(id))
            .flatten()
            .cloned()
            .collect())
    }

    async fn totals_for(&self, document_ids: &[i64]) -> AppResult<HashMap<i64, Decimal>> {
        let lines = self.lines_for(document_ids).await?;
        Ok(batch_totals(&lines))
    }

    async fn search_offset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<DocumentHeader>, u64)> {
        let state = self.state()?;
        let matching = state.matching(kind, filter);
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn search_keyset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        cursor: Option<KeysetCursor>,
        limit: u32,
    ) -> AppResult<Vec<DocumentHeader>> {
        let state = self.state()?;
        Ok(state
            .matching(kind, filter)
            .into_iter()
            .filter(|h| cursor.map_or(true, |c| c.admits(h.document_date, h.id)))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stores_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, StoreRef>> {
        let state = self.state()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.stores.get(id))
            .map(|s| (s.id, s.clone()))
            .collect())
    }

    async fn stock_entry(
        &self,
        key: StockKey,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry> {
        let mut state = self.state()?;
        Ok(state.stock_or_create(key, defaults, Utc::now()).clone())
    }

    async fn apply_import(
        &self,
        key: StockKey,
        quantity: i64,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry> {
        let mut state = self.state()?;
        let now = Utc::now();
        let entry = state.stock_or_create(key, defaults, now);
        entry.quantity = entry
            .quantity
            .checked_add(quantity)
            .ok_or(QuantityOverflow::at(key))?;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn apply_export(&self, key: StockKey, quantity: i64) -> AppResult<StockEntry> {
        let mut state = self.state()?;
        match state.stock.get_mut(&key) {
            Some(entry) if entry.quantity >= quantity => {
                entry.quantity -= quantity;
                entry.updated_at = Utc::now();
                Ok(entry.clone())
            }
            other => Err(AppError::InsufficientStock(StockShortfall {
                product_id: key.product_id,
                store_id: key.store_id,
                available: other.map(|e| e.quantity).unwrap_or(0),
                requested: quantity,
            })),
        }
    }

    async fn upsert_stock(
        &self,
        upsert: StockUpsert,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry> {
        let mut state = self.state()?;
        let now = Utc::now();
        let key = StockKey::new(upsert.product_id, upsert.store_id);
        let entry = state.stock_or_create(key, defaults, now);
        if let Some(quantity) = upsert.quantity {
            entry.quantity = quantity;
        }
        if let Some(min_stock) = upsert.min_stock {
            entry.min_stock = min_stock;
        }
        if let Some(max_stock) = upsert.max_stock {
            entry.max_stock = max_stock;
        }
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn stock_page(&self, pagination: Pagination) -> AppResult<(Vec<StockEntry>, u64)> {
        let state = self.state()?;
        let total = state.stock.len() as u64;
        let page = state
            .stock
            .values()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn stock_by_product(&self, product_id: i64) -> AppResult<Vec<StockEntry>> {
        let state = self.state()?;
        Ok(state
            .stock
            .values()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn stock_by_store(&self, store_id: i64) -> AppResult<Vec<StockEntry>> {
        let state = self.state()?;
        Ok(state
            .stock
            .values()
            .filter(|e| e.store_id == store_id)
            .cloned()
            .collect())
    }
}
