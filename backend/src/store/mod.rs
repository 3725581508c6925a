//! Persistence boundary for documents, inventory checks and the stock ledger
//!
//! Each method that changes a document runs its lifecycle check and its
//! writes as one atomic unit. Implementations never check-then-write across
//! two calls.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    next_status, CheckLine, CounterpartySnapshot, DocumentAction, DocumentFilter, DocumentHeader,
    DocumentKind, DocumentLine, KeysetCursor, NewCheckLine, NewLine, Pagination, StockEntry,
    StockKey, StockThresholds, StockUpsert, TransitionError,
};

use crate::error::{AppError, AppResult};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Warehouse display data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoreRef {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// Validated header fields and lines, ready to be written
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub kind: DocumentKind,
    pub code: String,
    pub store_id: i64,
    pub counterparty_id: Option<i64>,
    pub counterparty: CounterpartySnapshot,
    pub order_id: Option<i64>,
    pub note: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<String>,
    pub lines: DraftLines,
}

/// Lines of a draft: priced movements for imports and exports, counts for checks
#[derive(Debug, Clone)]
pub enum DraftLines {
    Priced(Vec<NewLine>),
    Counted(Vec<NewCheckLine>),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cheap connectivity check
    async fn ping(&self) -> AppResult<()>;

    /// Persist a new PENDING document with its lines
    async fn insert_document(
        &self,
        draft: DocumentDraft,
        actor_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DocumentHeader>;

    /// Overwrite header fields and replace every line of an editable document
    async fn replace_document(
        &self,
        id: i64,
        draft: DocumentDraft,
        at: DateTime<Utc>,
    ) -> AppResult<DocumentHeader>;

    async fn find_document(&self, kind: DocumentKind, id: i64)
        -> AppResult<Option<DocumentHeader>>;

    /// Approve, reject or cancel. `reason` replaces the note when given.
    async fn transition_document(
        &self,
        kind: DocumentKind,
        id: i64,
        action: DocumentAction,
        actor_id: i64,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> AppResult<DocumentHeader>;

    /// Apply every line to the ledger and complete the document, or change nothing.
    ///
    /// Imports add, exports subtract and checks apply their counted
    /// differences; entries created on the way get `import_defaults`.
    async fn confirm_document(
        &self,
        kind: DocumentKind,
        id: i64,
        actor_id: i64,
        at: DateTime<Utc>,
        import_defaults: StockThresholds,
    ) -> AppResult<DocumentHeader>;

    /// Lines of all given documents, ordered by document then line id
    async fn lines_for(&self, document_ids: &[i64]) -> AppResult<Vec<DocumentLine>>;

    /// Counted lines of all given inventory checks, ordered by check then line id
    async fn check_lines_for(&self, document_ids: &[i64]) -> AppResult<Vec<CheckLine>>;

    /// Discounted totals of all given documents in one aggregate
    async fn totals_for(&self, document_ids: &[i64]) -> AppResult<HashMap<i64, Decimal>>;

    /// Page of matching headers plus the total match count
    async fn search_offset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<DocumentHeader>, u64)>;

    /// Up to `limit` matching headers strictly after `cursor`
    async fn search_keyset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        cursor: Option<KeysetCursor>,
        limit: u32,
    ) -> AppResult<Vec<DocumentHeader>>;

    async fn stores_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, StoreRef>>;

    /// Entry for `key`, created with `defaults` and zero quantity when absent
    async fn stock_entry(&self, key: StockKey, defaults: StockThresholds)
        -> AppResult<StockEntry>;

    /// Unconditional increment
    async fn apply_import(
        &self,
        key: StockKey,
        quantity: i64,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry>;

    /// Decrement that fails with InsufficientStock instead of going negative
    async fn apply_export(&self, key: StockKey, quantity: i64) -> AppResult<StockEntry>;

    async fn upsert_stock(
        &self,
        upsert: StockUpsert,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry>;

    async fn stock_page(&self, pagination: Pagination) -> AppResult<(Vec<StockEntry>, u64)>;

    async fn stock_by_product(&self, product_id: i64) -> AppResult<Vec<StockEntry>>;

    async fn stock_by_store(&self, store_id: i64) -> AppResult<Vec<StockEntry>>;
}

/// Deduplicated ids in ascending order
pub(crate) fn distinct_ids(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Move `header` through `action`, recording who did it and when.
///
/// Header fields of an edit are applied separately by the caller.
pub(crate) fn stamp_transition(
    header: &mut DocumentHeader,
    action: DocumentAction,
    actor_id: i64,
    at: DateTime<Utc>,
    reason: Option<String>,
) -> Result<(), TransitionError> {
    let next = next_status(header.kind, header.status, action)?;

    match action {
        DocumentAction::Edit => {}
        DocumentAction::Approve => {
            header.approved_by = Some(actor_id);
            header.approved_at = Some(at);
        }
        DocumentAction::Reject => {
            header.rejected_by = Some(actor_id);
            header.rejected_at = Some(at);
            if reason.is_some() {
                header.note = reason;
            }
        }
        DocumentAction::Cancel => {
            header.cancelled_by = Some(actor_id);
            header.cancelled_at = Some(at);
        }
        DocumentAction::Confirm => {
            header.completed_by = Some(actor_id);
            header.completed_at = Some(at);
        }
    }

    header.status = next;
    header.updated_at = at;
    Ok(())
}

/// Copy the editable fields of a draft onto an existing header
pub(crate) fn apply_draft(header: &mut DocumentHeader, draft: &DocumentDraft) {
    header.code = draft.code.clone();
    header.store_id = draft.store_id;
    header.counterparty_id = draft.counterparty_id;
    header.counterparty = draft.counterparty.clone();
    header.order_id = draft.order_id;
    header.note = draft.note.clone();
    header.description = draft.description.clone();
    header.attachments = draft.attachments.clone();
}

pub(crate) fn document_not_found(kind: DocumentKind, id: i64) -> AppError {
    AppError::NotFound(format!("{} document {}", kind, id))
}

/// Confirm and edit carry their own writes and have dedicated store methods
pub(crate) fn ensure_status_only(action: DocumentAction) -> AppResult<()> {
    match action {
        DocumentAction::Approve | DocumentAction::Reject | DocumentAction::Cancel => Ok(()),
        DocumentAction::Edit | DocumentAction::Confirm => Err(AppError::Internal(format!(
            "{} is not a status-only transition",
            action
        ))),
    }
}
