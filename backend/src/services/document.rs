//! Import/export document service: lifecycle operations and enriched views

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    allowed_actions, batch_totals, document_total, generate_document_code, has_counterparty,
    next_status, non_blank, normalize_attachments, prepare_lines, resolve_store_id, truncate_note,
    CounterpartyRole, CounterpartySnapshot, DocumentAction, DocumentFilter, DocumentHeader,
    DocumentInput, DocumentKind, DocumentLine, DocumentStatus, KeysetCursor, KeysetPage,
    PaginatedResponse, PricedLine,
};

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::external::{IdentityDirectory, PartyDirectory, PartyProfile, UserProfile};
use crate::store::{document_not_found, DocumentDraft, DraftLines, LedgerStore, StoreRef};

/// Document service for supplier receipts and customer issuances
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn LedgerStore>,
    identity: Arc<dyn IdentityDirectory>,
    parties: Arc<dyn PartyDirectory>,
    ledger: LedgerConfig,
}

/// Warehouse reference with display data when known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub id: i64,
    pub code: Option<String>,
    pub name: Option<String>,
}

impl StoreInfo {
    pub(crate) fn resolve(id: i64, stores: &HashMap<i64, StoreRef>) -> Self {
        let store = stores.get(&id);
        Self {
            id,
            code: store.map(|s| s.code.clone()),
            name: store.map(|s| s.name.clone()),
        }
    }
}

/// Supplier (imports) or customer (exports) as displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartyView {
    pub role: Option<CounterpartyRole>,
    pub id: Option<i64>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Who performed a transition, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub actor_id: i64,
    pub actor_name: Option<String>,
    pub actor_role: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub created: AuditStamp,
    pub approved: Option<AuditStamp>,
    pub rejected: Option<AuditStamp>,
    pub cancelled: Option<AuditStamp>,
    /// Imported, exported or adjusted, depending on the kind
    pub completed: Option<AuditStamp>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineView {
    pub id: i64,
    pub product_id: i64,
    pub store: StoreInfo,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub discount_percent: Option<Decimal>,
    pub total: Decimal,
}

/// Document as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: i64,
    pub kind: DocumentKind,
    pub code: String,
    pub status: DocumentStatus,
    pub document_date: DateTime<Utc>,
    pub store: StoreInfo,
    pub counterparty: CounterpartyView,
    pub order_id: Option<i64>,
    pub note: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<String>,
    pub items: Vec<LineView>,
    pub total: Decimal,
    pub audit: AuditTrail,
    pub allowed_actions: Vec<DocumentAction>,
}

/// Where list totals come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TotalsSource {
    /// Computed in process from the fetched lines
    Lines,
    /// One aggregate query for the whole page
    Aggregate,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        identity: Arc<dyn IdentityDirectory>,
        parties: Arc<dyn PartyDirectory>,
        ledger: LedgerConfig,
    ) -> Self {
        Self {
            store,
            identity,
            parties,
            ledger,
        }
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Create a PENDING import or export
    pub async fn create(
        &self,
        kind: DocumentKind,
        input: DocumentInput,
        actor_id: i64,
    ) -> AppResult<DocumentView> {
        let now = Utc::now();
        let (draft, total) = self.prepare_draft(kind, &input, None, now)?;
        let header = self.store.insert_document(draft, actor_id, now).await?;

        tracing::info!(
            "Created {} document {} ({}) by user {}, total {}",
            kind,
            header.id,
            header.code,
            actor_id,
            total
        );
        self.view(header, TotalsSource::Lines).await
    }

    /// Replace header fields and lines of a PENDING document.
    ///
    /// The status is checked before the input so a locked document reports
    /// the transition error rather than a validation one.
    pub async fn update(
        &self,
        kind: DocumentKind,
        id: i64,
        input: DocumentInput,
        actor_id: i64,
    ) -> AppResult<DocumentView> {
        let existing = self
            .store
            .find_document(kind, id)
            .await?
            .ok_or_else(|| document_not_found(kind, id))?;
        // Non-editable documents fail here, before their input is judged
        next_status(kind, existing.status, DocumentAction::Edit)?;

        let now = Utc::now();
        let (draft, _) = self.prepare_draft(kind, &input, Some(&existing.code), now)?;
        // The store re-checks the status under its lock
        let header = self.store.replace_document(id, draft, now).await?;

        tracing::info!("Updated {} document {} by user {}", kind, id, actor_id);
        self.view(header, TotalsSource::Lines).await
    }

    fn prepare_draft(
        &self,
        kind: DocumentKind,
        input: &DocumentInput,
        existing_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<(DocumentDraft, Decimal)> {
        // Counted documents go through the check service
        let role = kind.counterparty_role().ok_or_else(|| {
            AppError::Internal(format!("{} documents do not carry priced lines", kind))
        })?;

        let store_id = resolve_store_id(input.store_id, &input.items)
            .ok_or_else(|| AppError::validation("store_id", "A store is required"))?;

        if !has_counterparty(kind, input.counterparty_id, input.counterparty_name.as_deref()) {
            return Err(match role {
                CounterpartyRole::Supplier => {
                    AppError::validation("counterparty_id", "A supplier is required")
                }
                CounterpartyRole::Customer => AppError::validation(
                    "counterparty_id",
                    "A customer id or customer name is required",
                ),
            });
        }

        let lines = prepare_lines(&input.items, store_id)?;
        let total = document_total(&lines);

        let code = non_blank(input.code.as_deref())
            .map(str::to_string)
            .or_else(|| existing_code.map(str::to_string))
            .unwrap_or_else(|| generate_document_code(kind, now));

        let owned = |value: &Option<String>| non_blank(value.as_deref()).map(str::to_string);

        let draft = DocumentDraft {
            kind,
            code,
            store_id,
            counterparty_id: input.counterparty_id,
            counterparty: CounterpartySnapshot {
                name: owned(&input.counterparty_name),
                phone: owned(&input.counterparty_phone),
                address: owned(&input.counterparty_address),
            },
            order_id: input.order_id,
            note: input
                .note
                .as_deref()
                .map(|n| truncate_note(n, self.ledger.note_max_length)),
            description: input.description.clone(),
            attachments: normalize_attachments(&input.attachments),
            lines: DraftLines::Priced(lines),
        };
        Ok((draft, total))
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub async fn approve(&self, kind: DocumentKind, id: i64, actor_id: i64) -> AppResult<DocumentView> {
        self.transition(kind, id, DocumentAction::Approve, actor_id, None)
            .await
    }

    /// Reject a PENDING document; a non-blank reason replaces the note
    pub async fn reject(
        &self,
        kind: DocumentKind,
        id: i64,
        actor_id: i64,
        reason: Option<String>,
    ) -> AppResult<DocumentView> {
        let reason = non_blank(reason.as_deref())
            .map(|r| truncate_note(r, self.ledger.note_max_length));
        self.transition(kind, id, DocumentAction::Reject, actor_id, reason)
            .await
    }

    pub async fn cancel(&self, kind: DocumentKind, id: i64, actor_id: i64) -> AppResult<DocumentView> {
        self.transition(kind, id, DocumentAction::Cancel, actor_id, None)
            .await
    }

    async fn transition(
        &self,
        kind: DocumentKind,
        id: i64,
        action: DocumentAction,
        actor_id: i64,
        reason: Option<String>,
    ) -> AppResult<DocumentView> {
        let header = self
            .store
            .transition_document(kind, id, action, actor_id, Utc::now(), reason)
            .await?;

        tracing::info!(
            "{} document {} moved to {} by user {} ({})",
            kind,
            id,
            header.status,
            actor_id,
            action
        );
        self.view(header, TotalsSource::Lines).await
    }

    /// Apply an APPROVED document to the stock ledger
    pub async fn confirm(&self, kind: DocumentKind, id: i64, actor_id: i64) -> AppResult<DocumentView> {
        let result = self
            .store
            .confirm_document(kind, id, actor_id, Utc::now(), self.ledger.import_defaults())
            .await;

        let header = match result {
            Ok(header) => header,
            Err(AppError::InsufficientStock(shortfall)) => {
                tracing::warn!(
                    "Confirm of {} document {} refused: product {} at store {} has {}, needs {}",
                    kind,
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
            "{} document {} confirmed as {} by user {}",
            kind,
            id,
            header.status,
            actor_id
        );
        self.view(header, TotalsSource::Lines).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, kind: DocumentKind, id: i64) -> AppResult<DocumentView> {
        let header = self
            .store
            .find_document(kind, id)
            .await?
            .ok_or_else(|| document_not_found(kind, id))?;
        self.view(header, TotalsSource::Lines).await
    }

    /// Offset-paginated search
    pub async fn search(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        page: Option<u32>,
        size: Option<u32>,
    ) -> AppResult<PaginatedResponse<DocumentView>> {
        let pagination = self.ledger.pagination(page, size);
        let started = std::time::Instant::now();
        let (headers, total) = self.store.search_offset(kind, filter, pagination).await?;
        tracing::debug!(
            "{} search page {} returned {} of {} in {:?}",
            kind,
            pagination.page,
            headers.len(),
            total,
            started.elapsed()
        );

        let views = self.assemble(headers, TotalsSource::Aggregate).await?;
        Ok(PaginatedResponse::new(views, pagination, total))
    }

    /// Keyset-paginated search, newest first
    pub async fn search_keyset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        cursor: Option<KeysetCursor>,
        size: Option<u32>,
    ) -> AppResult<KeysetPage<DocumentView>> {
        let size = self.ledger.pagination(None, size).per_page;
        let started = std::time::Instant::now();
        let mut headers = self
            .store
            .search_keyset(kind, filter, cursor, size + 1)
            .await?;

        let has_more = headers.len() > size as usize;
        headers.truncate(size as usize);
        let next_cursor = headers
            .last()
            .map(|h| KeysetCursor::new(h.document_date, h.id));
        tracing::debug!(
            "{} keyset search returned {} rows (more: {}) in {:?}",
            kind,
            headers.len(),
            has_more,
            started.elapsed()
        );

        let data = self.assemble(headers, TotalsSource::Aggregate).await?;
        Ok(KeysetPage {
            data,
            next_cursor,
            has_more,
        })
    }

    // ========================================================================
    // View assembly
    // ========================================================================

    async fn view(&self, header: DocumentHeader, totals: TotalsSource) -> AppResult<DocumentView> {
        let mut views = self.assemble(vec![header], totals).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("document view was not assembled".to_string()))
    }

    /// Build views for a page of headers with a fixed number of lookups
    async fn assemble(
        &self,
        headers: Vec<DocumentHeader>,
        totals_source: TotalsSource,
    ) -> AppResult<Vec<DocumentView>> {
        if headers.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<i64> = headers.iter().map(|h| h.id).collect();
        let lines = self.store.lines_for(&ids).await?;
        let totals = match totals_source {
            TotalsSource::Lines => batch_totals(&lines),
            TotalsSource::Aggregate => self.store.totals_for(&ids).await?,
        };

        let store_ids: Vec<i64> = headers
            .iter()
            .map(|h| h.store_id)
            .chain(lines.iter().map(|l| l.store_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let stores = self.store.stores_by_ids(&store_ids).await?;

        let suppliers = self
            .lookup_parties(CounterpartyRole::Supplier, &headers)
            .await;
        let customers = self
            .lookup_parties(CounterpartyRole::Customer, &headers)
            .await;
        let users = lookup_users(self.identity.as_ref(), &headers).await;
        let no_parties = HashMap::new();

        let mut lines_by_document: HashMap<i64, Vec<DocumentLine>> = HashMap::new();
        for line in lines {
            lines_by_document
                .entry(line.document_id)
                .or_default()
                .push(line);
        }

        Ok(headers
            .into_iter()
            .map(|header| {
                let lines = lines_by_document.remove(&header.id).unwrap_or_default();
                let parties = match header.kind.counterparty_role() {
                    Some(CounterpartyRole::Supplier) => &suppliers,
                    Some(CounterpartyRole::Customer) => &customers,
                    None => &no_parties,
                };
                let total = totals.get(&header.id).copied().unwrap_or(Decimal::ZERO);
                build_view(header, lines, total, &stores, parties, &users)
            })
            .collect())
    }

    /// Counterparties that need a master-data lookup for `role`.
    ///
    /// Exports with a typed-in customer name are shown as entered.
    async fn lookup_parties(
        &self,
        role: CounterpartyRole,
        headers: &[DocumentHeader],
    ) -> HashMap<i64, PartyProfile> {
        let ids: Vec<i64> = headers
            .iter()
            .filter(|h| h.kind.counterparty_role() == Some(role))
            .filter(|h| role == CounterpartyRole::Supplier || h.counterparty.name.is_none())
            .filter_map(|h| h.counterparty_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.parties.parties_by_ids(role, &ids).await {
            Ok(parties) => parties,
            Err(e) => {
                tracing::warn!("{} lookup failed, showing ids only: {}", role.as_str(), e);
                HashMap::new()
            }
        }
    }
}

/// Audit names for every actor on a page; a failed lookup leaves them empty
pub(crate) async fn lookup_users(
    identity: &dyn IdentityDirectory,
    headers: &[DocumentHeader],
) -> HashMap<i64, UserProfile> {
    let ids: Vec<i64> = headers
        .iter()
        .flat_map(DocumentHeader::actor_ids)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    match identity.users_by_ids(&ids).await {
        Ok(users) => users,
        Err(e) => {
            tracing::warn!("User lookup failed, audit names left empty: {}", e);
            HashMap::new()
        }
    }
}

fn stamp(
    actor_id: Option<i64>,
    at: Option<DateTime<Utc>>,
    users: &HashMap<i64, UserProfile>,
) -> Option<AuditStamp> {
    let (actor_id, at) = (actor_id?, at?);
    let user = users.get(&actor_id);
    Some(AuditStamp {
        actor_id,
        actor_name: user.and_then(|u| u.full_name.clone()),
        actor_role: user.and_then(|u| u.role.clone()),
        at,
    })
}

pub(crate) fn audit_trail(header: &DocumentHeader, users: &HashMap<i64, UserProfile>) -> AuditTrail {
    let creator = users.get(&header.created_by);
    AuditTrail {
        created: AuditStamp {
            actor_id: header.created_by,
            actor_name: creator.and_then(|u| u.full_name.clone()),
            actor_role: creator.and_then(|u| u.role.clone()),
            at: header.created_at,
        },
        approved: stamp(header.approved_by, header.approved_at, users),
        rejected: stamp(header.rejected_by, header.rejected_at, users),
        cancelled: stamp(header.cancelled_by, header.cancelled_at, users),
        completed: stamp(header.completed_by, header.completed_at, users),
        updated_at: header.updated_at,
    }
}

fn counterparty_view(header: &DocumentHeader, party: Option<&PartyProfile>) -> CounterpartyView {
    let snapshot = &header.counterparty;
    let from_party = |f: fn(&PartyProfile) -> &Option<String>| party.and_then(|p| f(p).clone());

    let role = header.kind.counterparty_role();
    let (name, phone, address) = match role {
        // Master data is authoritative for suppliers
        Some(CounterpartyRole::Supplier) => (
            from_party(|p| &p.name).or_else(|| snapshot.name.clone()),
            from_party(|p| &p.phone).or_else(|| snapshot.phone.clone()),
            from_party(|p| &p.address).or_else(|| snapshot.address.clone()),
        ),
        // What was typed on the document wins for customers
        Some(CounterpartyRole::Customer) | None => (
            snapshot.name.clone().or_else(|| from_party(|p| &p.name)),
            snapshot.phone.clone().or_else(|| from_party(|p| &p.phone)),
            snapshot.address.clone().or_else(|| from_party(|p| &p.address)),
        ),
    };

    CounterpartyView {
        role,
        id: header.counterparty_id,
        code: from_party(|p| &p.code),
        name,
        phone,
        address,
    }
}

fn build_view(
    header: DocumentHeader,
    lines: Vec<DocumentLine>,
    total: Decimal,
    stores: &HashMap<i64, StoreRef>,
    parties: &HashMap<i64, PartyProfile>,
    users: &HashMap<i64, UserProfile>,
) -> DocumentView {
    let party = header.counterparty_id.and_then(|id| parties.get(&id));
    let counterparty = counterparty_view(&header, party);

    let items = lines
        .iter()
        .map(|line| LineView {
            id: line.id,
            product_id: line.product_id,
            store: StoreInfo::resolve(line.store_id, stores),
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount_percent: line.discount_percent,
            total: line.total(),
        })
        .collect();

    let audit = audit_trail(&header, users);

    DocumentView {
        id: header.id,
        kind: header.kind,
        code: header.code,
        status: header.status,
        document_date: header.document_date,
        store: StoreInfo::resolve(header.store_id, stores),
        counterparty,
        order_id: header.order_id,
        note: header.note,
        description: header.description,
        attachments: header.attachments,
        items,
        total,
        audit,
        allowed_actions: allowed_actions(header.kind, header.status),
    }
}
