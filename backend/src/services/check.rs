//! Inventory check service: counted documents that reconcile the ledger
//!
//! Checks share headers, lifecycle and search with imports and exports.
//! Confirming one moves every counted entry by its difference.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    allowed_actions, check_total, generate_document_code, next_status, non_blank,
    normalize_attachments, prepare_check_lines, truncate_note, CheckInput, CheckLine,
    CounterpartySnapshot, DocumentAction, DocumentFilter, DocumentHeader, DocumentKind,
    DocumentStatus, KeysetCursor, KeysetPage, PaginatedResponse,
};

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::external::{IdentityDirectory, UserProfile};
use crate::services::document::{audit_trail, lookup_users, AuditTrail, StoreInfo};
use crate::store::{document_not_found, DocumentDraft, DraftLines, LedgerStore, StoreRef};

const KIND: DocumentKind = DocumentKind::Check;

/// Inventory check service over the ledger store
#[derive(Clone)]
pub struct CheckService {
    store: Arc<dyn LedgerStore>,
    identity: Arc<dyn IdentityDirectory>,
    ledger: LedgerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckLineView {
    pub id: i64,
    pub product_id: i64,
    pub store: StoreInfo,
    pub system_quantity: i64,
    pub actual_quantity: i64,
    /// Actual minus system; the change confirming applies
    pub difference: i64,
    pub unit_price: Option<Decimal>,
    pub difference_value: Option<Decimal>,
    pub note: Option<String>,
}

/// Inventory check as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckView {
    pub id: i64,
    pub code: String,
    pub status: DocumentStatus,
    pub document_date: DateTime<Utc>,
    pub store: StoreInfo,
    pub note: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<String>,
    pub items: Vec<CheckLineView>,
    /// Valued sum of the differences of priced lines
    pub total_difference_value: Decimal,
    pub audit: AuditTrail,
    pub allowed_actions: Vec<DocumentAction>,
}

impl CheckService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        identity: Arc<dyn IdentityDirectory>,
        ledger: LedgerConfig,
    ) -> Self {
        Self {
            store,
            identity,
            ledger,
        }
    }

    /// Create a PENDING check
    pub async fn create(&self, input: CheckInput, actor_id: i64) -> AppResult<CheckView> {
        let now = Utc::now();
        let draft = self.prepare_draft(&input, None, now)?;
        let header = self.store.insert_document(draft, actor_id, now).await?;

        tracing::info!(
            "Created inventory check {} ({}) at store {} by user {}",
            header.id,
            header.code,
            header.store_id,
            actor_id
        );
        self.view(header).await
    }

    /// Replace header fields and counted lines of a PENDING check
    pub async fn update(&self, id: i64, input: CheckInput, actor_id: i64) -> AppResult<CheckView> {
        let existing = self
            .store
            .find_document(KIND, id)
            .await?
            .ok_or_else(|| document_not_found(KIND, id))?;
        next_status(KIND, existing.status, DocumentAction::Edit)?;

        let now = Utc::now();
        let draft = self.prepare_draft(&input, Some(&existing.code), now)?;
        let header = self.store.replace_document(id, draft, now).await?;

        tracing::info!("Updated inventory check {} by user {}", id, actor_id);
        self.view(header).await
    }

    fn prepare_draft(
        &self,
        input: &CheckInput,
        existing_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<DocumentDraft> {
        let store_id = input
            .store_id
            .or_else(|| input.items.iter().find_map(|item| item.store_id))
            .ok_or_else(|| AppError::validation("store_id", "A store is required"))?;

        let lines = prepare_check_lines(&input.items, store_id)?;

        let code = non_blank(input.code.as_deref())
            .map(str::to_string)
            .or_else(|| existing_code.map(str::to_string))
            .unwrap_or_else(|| generate_document_code(KIND, now));

        Ok(DocumentDraft {
            kind: KIND,
            code,
            store_id,
            counterparty_id: None,
            counterparty: CounterpartySnapshot::default(),
            order_id: None,
            note: input
                .note
                .as_deref()
                .map(|n| truncate_note(n, self.ledger.note_max_length)),
            description: input.description.clone(),
            attachments: normalize_attachments(&input.attachments),
            lines: DraftLines::Counted(lines),
        })
    }

    pub async fn approve(&self, id: i64, actor_id: i64) -> AppResult<CheckView> {
        self.transition(id, DocumentAction::Approve, actor_id, None)
            .await
    }

    /// Reject a PENDING check; a non-blank reason replaces the note
    pub async fn reject(&self, id: i64, actor_id: i64, reason: Option<String>) -> AppResult<CheckView> {
        let reason = non_blank(reason.as_deref())
            .map(|r| truncate_note(r, self.ledger.note_max_length));
        self.transition(id, DocumentAction::Reject, actor_id, reason)
            .await
    }

    /// Withdraw a PENDING check; the header is kept for the audit trail
    pub async fn cancel(&self, id: i64, actor_id: i64) -> AppResult<CheckView> {
        self.transition(id, DocumentAction::Cancel, actor_id, None)
            .await
    }

    async fn transition(
        &self,
        id: i64,
        action: DocumentAction,
        actor_id: i64,
        reason: Option<String>,
    ) -> AppResult<CheckView> {
        let header = self
            .store
            .transition_document(KIND, id, action, actor_id, Utc::now(), reason)
            .await?;

        tracing::info!(
            "Inventory check {} moved to {} by user {} ({})",
            id,
            header.status,
            actor_id,
            action
        );
        self.view(header).await
    }

    /// Apply the counted differences of an APPROVED check to the ledger
    pub async fn confirm(&self, id: i64, actor_id: i64) -> AppResult<CheckView> {
        let result = self
            .store
            .confirm_document(KIND, id, actor_id, Utc::now(), self.ledger.import_defaults())
            .await;

        let header = match result {
            Ok(header) => header,
            Err(AppError::InsufficientStock(shortfall)) => {
                tracing::warn!(
                    "Confirm of inventory check {} refused: product {} at store {} has {}, count removes {}",
                    id,
                    shortfall.product_id,
                    shortfall.store_id,
                    shortfall.available,
                    shortfall.requested
                );
                return Err(AppError::InsufficientStock(shortfall));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "Inventory check {} confirmed as {} by user {}",
            id,
            header.status,
            actor_id
        );
        self.view(header).await
    }

    pub async fn get(&self, id: i64) -> AppResult<CheckView> {
        let header = self
            .store
            .find_document(KIND, id)
            .await?
            .ok_or_else(|| document_not_found(KIND, id))?;
        self.view(header).await
    }

    /// Offset-paginated search
    pub async fn search(
        &self,
        filter: &DocumentFilter,
        page: Option<u32>,
        size: Option<u32>,
    ) -> AppResult<PaginatedResponse<CheckView>> {
        let pagination = self.ledger.pagination(page, size);
        let (headers, total) = self.store.search_offset(KIND, filter, pagination).await?;
        tracing::debug!(
            "Inventory check search page {} returned {} of {}",
            pagination.page,
            headers.len(),
            total
        );

        let views = self.assemble(headers).await?;
        Ok(PaginatedResponse::new(views, pagination, total))
    }

    /// Keyset-paginated search, newest first
    pub async fn search_keyset(
        &self,
        filter: &DocumentFilter,
        cursor: Option<KeysetCursor>,
        size: Option<u32>,
    ) -> AppResult<KeysetPage<CheckView>> {
        let size = self.ledger.pagination(None, size).per_page;
        let mut headers = self
            .store
            .search_keyset(KIND, filter, cursor, size + 1)
            .await?;

        let has_more = headers.len() > size as usize;
        headers.truncate(size as usize);
        let next_cursor = headers
            .last()
            .map(|h| KeysetCursor::new(h.document_date, h.id));

        let data = self.assemble(headers).await?;
        Ok(KeysetPage {
            data,
            next_cursor,
            has_more,
        })
    }

    async fn view(&self, header: DocumentHeader) -> AppResult<CheckView> {
        let mut views = self.assemble(vec![header]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("check view was not assembled".to_string()))
    }

    /// Views for a page of checks: one line query, one store query, one user lookup
    async fn assemble(&self, headers: Vec<DocumentHeader>) -> AppResult<Vec<CheckView>> {
        if headers.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
        let lines = self.store.check_lines_for(&ids).await?;

        let store_ids: Vec<i64> = headers
            .iter()
            .map(|h| h.store_id)
            .chain(lines.iter().map(|l| l.store_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let stores = self.store.stores_by_ids(&store_ids).await?;
        let users = lookup_users(self.identity.as_ref(), &headers).await;

        let mut lines_by_check: HashMap<i64, Vec<CheckLine>> = HashMap::new();
        for line in lines {
            lines_by_check.entry(line.document_id).or_default().push(line);
        }

        Ok(headers
            .into_iter()
            .map(|header| {
                let lines = lines_by_check.remove(&header.id).unwrap_or_default();
                build_view(header, lines, &stores, &users)
            })
            .collect())
    }
}

fn build_view(
    header: DocumentHeader,
    lines: Vec<CheckLine>,
    stores: &HashMap<i64, StoreRef>,
    users: &HashMap<i64, UserProfile>,
) -> CheckView {
    let total_difference_value = check_total(&lines);
    let audit = audit_trail(&header, users);

    let items = lines
        .into_iter()
        .map(|line| CheckLineView {
            id: line.id,
            product_id: line.product_id,
            store: StoreInfo::resolve(line.store_id, stores),
            system_quantity: line.system_quantity,
            actual_quantity: line.actual_quantity,
            difference: line.difference(),
            unit_price: line.unit_price,
            difference_value: line.difference_value(),
            note: line.note,
        })
        .collect();

    CheckView {
        id: header.id,
        code: header.code,
        status: header.status,
        document_date: header.document_date,
        store: StoreInfo::resolve(header.store_id, stores),
        note: header.note,
        description: header.description,
        attachments: header.attachments,
        items,
        total_difference_value,
        audit,
        allowed_actions: allowed_actions(header.kind, header.status),
    }
}
