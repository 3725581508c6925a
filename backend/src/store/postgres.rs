use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    find_shortfall, signed_movements, CheckLine, CounterpartySnapshot, DocumentAction,
    DocumentFilter, DocumentHeader, DocumentKind, DocumentLine, DocumentStatus, KeysetCursor,
    Pagination, QuantityOverflow, StockEntry, StockKey, StockShortfall, StockThresholds,
    StockUpsert,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::{
    apply_draft, distinct_ids, document_not_found, ensure_status_only, stamp_transition,
    DocumentDraft, DraftLines, LedgerStore, StoreRef,
};
use crate::error::{AppError, AppResult};

const DOCUMENT_COLUMNS: &str = r#"
    id, kind, code, status, document_date, store_id, counterparty_id,
    counterparty_name, counterparty_phone, counterparty_address, order_id,
    note, description, attachments,
    created_by, created_at, approved_by, approved_at, rejected_by, rejected_at,
    cancelled_by, cancelled_at, completed_by, completed_at, updated_at
"#;

const LINE_COLUMNS: &str =
    "id, document_id, product_id, store_id, quantity, unit_price, discount_percent";

const CHECK_LINE_COLUMNS: &str =
    "id, document_id, product_id, store_id, system_quantity, actual_quantity, unit_price, note";

const STOCK_COLUMNS: &str = "id, product_id, store_id, quantity, min_stock, max_stock, updated_at";

/// Shared search predicate; `$1` is the kind, `$2..$7` the filter
const SEARCH_PREDICATE: &str = r#"
    kind = $1
    AND ($2::text IS NULL OR status = $2)
    AND ($3::text IS NULL OR code ILIKE $3 ESCAPE '\')
    AND ($4::bigint IS NULL OR store_id = $4)
    AND ($5::timestamptz IS NULL OR document_date >= $5)
    AND ($6::timestamptz IS NULL OR document_date < $6)
    AND ($7::bigint IS NULL OR order_id = $7)
"#;

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: i64,
    kind: String,
    code: String,
    status: String,
    document_date: DateTime<Utc>,
    store_id: i64,
    counterparty_id: Option<i64>,
    counterparty_name: Option<String>,
    counterparty_phone: Option<String>,
    counterparty_address: Option<String>,
    order_id: Option<i64>,
    note: Option<String>,
    description: Option<String>,
    attachments: Vec<String>,
    created_by: i64,
    created_at: DateTime<Utc>,
    approved_by: Option<i64>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<i64>,
    rejected_at: Option<DateTime<Utc>>,
    cancelled_by: Option<i64>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_by: Option<i64>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for DocumentHeader {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(DocumentHeader {
            id: row.id,
            kind: row.kind.parse().map_err(AppError::Internal)?,
            code: row.code,
            status: row.status.parse().map_err(AppError::Internal)?,
            document_date: row.document_date,
            store_id: row.store_id,
            counterparty_id: row.counterparty_id,
            counterparty: CounterpartySnapshot {
                name: row.counterparty_name,
                phone: row.counterparty_phone,
                address: row.counterparty_address,
            },
            order_id: row.order_id,
            note: row.note,
            description: row.description,
            attachments: row.attachments,
            created_by: row.created_by,
            created_at: row.created_at,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            rejected_by: row.rejected_by,
            rejected_at: row.rejected_at,
            cancelled_by: row.cancelled_by,
            cancelled_at: row.cancelled_at,
            completed_by: row.completed_by,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: i64,
    document_id: i64,
    product_id: i64,
    store_id: i64,
    quantity: i64,
    unit_price: Decimal,
    discount_percent: Option<Decimal>,
}

impl From<LineRow> for DocumentLine {
    fn from(row: LineRow) -> Self {
        DocumentLine {
            id: row.id,
            document_id: row.document_id,
            product_id: row.product_id,
            store_id: row.store_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            discount_percent: row.discount_percent,
        }
    }
}

#[derive(Debug, FromRow)]
struct CheckLineRow {
    id: i64,
    document_id: i64,
    product_id: i64,
    store_id: i64,
    system_quantity: i64,
    actual_quantity: i64,
    unit_price: Option<Decimal>,
    note: Option<String>,
}

impl From<CheckLineRow> for CheckLine {
    fn from(row: CheckLineRow) -> Self {
        CheckLine {
            id: row.id,
            document_id: row.document_id,
            product_id: row.product_id,
            store_id: row.store_id,
            system_quantity: row.system_quantity,
            actual_quantity: row.actual_quantity,
            unit_price: row.unit_price,
            note: row.note,
        }
    }
}

#[derive(Debug, FromRow)]
struct StockRow {
    id: i64,
    product_id: i64,
    store_id: i64,
    quantity: i64,
    min_stock: i64,
    max_stock: i64,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for StockEntry {
    fn from(row: StockRow) -> Self {
        StockEntry {
            id: row.id,
            product_id: row.product_id,
            store_id: row.store_id,
            quantity: row.quantity,
            min_stock: row.min_stock,
            max_stock: row.max_stock,
            updated_at: row.updated_at,
        }
    }
}

/// `%fragment%` with LIKE metacharacters escaped
fn like_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
}

impl PgLedgerStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Lock a header row for the rest of the transaction
    async fn lock_document(
        tx: &mut Transaction<'_, Postgres>,
        kind: DocumentKind,
        id: i64,
    ) -> AppResult<DocumentHeader> {
        let sql = format!(
            "SELECT {} FROM inventory_documents WHERE id = $1 AND kind = $2 FOR UPDATE",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| document_not_found(kind, id))?
            .try_into()
    }

    /// Persist status and audit columns of a header
    async fn write_status(
        tx: &mut Transaction<'_, Postgres>,
        header: &DocumentHeader,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory_documents
            SET status = $2, note = $3,
                approved_by = $4, approved_at = $5,
                rejected_by = $6, rejected_at = $7,
                cancelled_by = $8, cancelled_at = $9,
                completed_by = $10, completed_at = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(header.id)
        .bind(header.status.as_str())
        .bind(&header.note)
        .bind(header.approved_by)
        .bind(header.approved_at)
        .bind(header.rejected_by)
        .bind(header.rejected_at)
        .bind(header.cancelled_by)
        .bind(header.cancelled_at)
        .bind(header.completed_by)
        .bind(header.completed_at)
        .bind(header.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_lines(
        tx: &mut Transaction<'_, Postgres>,
        document_id: i64,
        draft: &DocumentDraft,
    ) -> AppResult<()> {
        match &draft.lines {
            DraftLines::Priced(lines) => {
                for line in lines {
                    sqlx::query(
                        r#"
                        INSERT INTO inventory_document_lines
                            (document_id, product_id, store_id, quantity, unit_price, discount_percent)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(document_id)
                    .bind(line.product_id)
                    .bind(line.store_id)
                    .bind(line.quantity)
                    .bind(line.unit_price)
                    .bind(line.discount_percent)
                    .execute(&mut **tx)
                    .await?;
                }
            }
            DraftLines::Counted(lines) => {
                for line in lines {
                    sqlx::query(
                        r#"
                        INSERT INTO inventory_check_lines
                            (document_id, product_id, store_id, system_quantity,
                             actual_quantity, unit_price, note)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        "#,
                    )
                    .bind(document_id)
                    .bind(line.product_id)
                    .bind(line.store_id)
                    .bind(line.system_quantity)
                    .bind(line.actual_quantity)
                    .bind(line.unit_price)
                    .bind(&line.note)
                    .execute(&mut **tx)
                    .await?;
                }
            }
        }
        Ok(())
    }

    /// Signed ledger change of one document, read inside the confirm transaction
    async fn document_deltas(
        tx: &mut Transaction<'_, Postgres>,
        kind: DocumentKind,
        id: i64,
    ) -> AppResult<BTreeMap<StockKey, i64>> {
        let mut lines: Vec<DocumentLine> = Vec::new();
        let mut counted: Vec<CheckLine> = Vec::new();

        if kind == DocumentKind::Check {
            let sql = format!(
                "SELECT {} FROM inventory_check_lines WHERE document_id = $1 ORDER BY id",
                CHECK_LINE_COLUMNS
            );
            counted = sqlx::query_as::<_, CheckLineRow>(&sql)
                .bind(id)
                .fetch_all(&mut **tx)
                .await?
                .into_iter()
                .map(CheckLine::from)
                .collect();
        } else {
            let sql = format!(
                "SELECT {} FROM inventory_document_lines WHERE document_id = $1 ORDER BY id",
                LINE_COLUMNS
            );
            lines = sqlx::query_as::<_, LineRow>(&sql)
                .bind(id)
                .fetch_all(&mut **tx)
                .await?
                .into_iter()
                .map(DocumentLine::from)
                .collect();
        }

        Ok(signed_movements(kind, &lines, &counted)?)
    }

    async fn current_quantity(&self, key: StockKey) -> AppResult<i64> {
        let quantity = sqlx::query_scalar::<_, i64>(
            "SELECT quantity FROM stock_entries WHERE product_id = $1 AND store_id = $2",
        )
        .bind(key.product_id)
        .bind(key.store_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(quantity.unwrap_or(0))
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_document(
        &self,
        draft: DocumentDraft,
        actor_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DocumentHeader> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO inventory_documents
                (kind, code, status, document_date, store_id, counterparty_id,
                 counterparty_name, counterparty_phone, counterparty_address, order_id,
                 note, description, attachments, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $4, $4)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );
        let header: DocumentHeader = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(draft.kind.as_str())
            .bind(&draft.code)
            .bind(DocumentStatus::Pending.as_str())
            .bind(at)
            .bind(draft.store_id)
            .bind(draft.counterparty_id)
            .bind(&draft.counterparty.name)
            .bind(&draft.counterparty.phone)
            .bind(&draft.counterparty.address)
            .bind(draft.order_id)
            .bind(&draft.note)
            .bind(&draft.description)
            .bind(&draft.attachments)
            .bind(actor_id)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

        Self::insert_lines(&mut tx, header.id, &draft).await?;

        tx.commit().await?;
        Ok(header)
    }

    async fn replace_document(
        &self,
        id: i64,
        draft: DocumentDraft,
        at: DateTime<Utc>,
    ) -> AppResult<DocumentHeader> {
        let mut tx = self.db.begin().await?;

        let mut header = Self::lock_document(&mut tx, draft.kind, id).await?;
        let created_by = header.created_by;
        stamp_transition(&mut header, DocumentAction::Edit, created_by, at, None)?;
        apply_draft(&mut header, &draft);

        sqlx::query(
            r#"
            UPDATE inventory_documents
            SET code = $2, store_id = $3, counterparty_id = $4,
                counterparty_name = $5, counterparty_phone = $6, counterparty_address = $7,
                order_id = $8, note = $9, description = $10, attachments = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&header.code)
        .bind(header.store_id)
        .bind(header.counterparty_id)
        .bind(&header.counterparty.name)
        .bind(&header.counterparty.phone)
        .bind(&header.counterparty.address)
        .bind(header.order_id)
        .bind(&header.note)
        .bind(&header.description)
        .bind(&header.attachments)
        .bind(header.updated_at)
        .execute(&mut *tx)
        .await?;

        for table in ["inventory_document_lines", "inventory_check_lines"] {
            sqlx::query(&format!("DELETE FROM {} WHERE document_id = $1", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        Self::insert_lines(&mut tx, id, &draft).await?;

        tx.commit().await?;
        Ok(header)
    }

    async fn find_document(
        &self,
        kind: DocumentKind,
        id: i64,
    ) -> AppResult<Option<DocumentHeader>> {
        let sql = format!(
            "SELECT {} FROM inventory_documents WHERE id = $1 AND kind = $2",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(&self.db)
            .await?
            .map(DocumentHeader::try_from)
            .transpose()
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
        let mut tx = self.db.begin().await?;

        let mut header = Self::lock_document(&mut tx, kind, id).await?;
        stamp_transition(&mut header, action, actor_id, at, reason)?;
        Self::write_status(&mut tx, &header).await?;

        tx.commit().await?;
        Ok(header)
    }

    async fn confirm_document(
        &self,
        kind: DocumentKind,
        id: i64,
        actor_id: i64,
        at: DateTime<Utc>,
        import_defaults: StockThresholds,
    ) -> AppResult<DocumentHeader> {
        let mut tx = self.db.begin().await?;

        // Header lock first: concurrent confirms of one document serialize here
        let mut header = Self::lock_document(&mut tx, kind, id).await?;
        stamp_transition(&mut header, DocumentAction::Confirm, actor_id, at, None)?;

        // BTreeMap iteration gives every confirm the same lock order
        let deltas = Self::document_deltas(&mut tx, kind, id).await?;

        let mut available: HashMap<StockKey, i64> = HashMap::new();
        for key in deltas.keys() {
            let quantity = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT quantity FROM stock_entries
                WHERE product_id = $1 AND store_id = $2
                FOR UPDATE
                "#,
            )
            .bind(key.product_id)
            .bind(key.store_id)
            .fetch_optional(&mut *tx)
            .await?;
            available.insert(*key, quantity.unwrap_or(0));
        }
        let available_at = |key: &StockKey| available.get(key).copied().unwrap_or(0);

        if let Some(shortfall) = find_shortfall(&deltas, available_at) {
            tx.rollback().await?;
            return Err(AppError::InsufficientStock(shortfall));
        }

        for (key, delta) in &deltas {
            if *delta > 0 {
                if available_at(key).checked_add(*delta).is_none() {
                    tx.rollback().await?;
                    return Err(QuantityOverflow::at(*key).into());
                }

                sqlx::query(
                    r#"
                    INSERT INTO stock_entries (product_id, store_id, quantity, min_stock, max_stock, updated_at)
                    VALUES ($1, $2, 0, $3, $4, $5)
                    ON CONFLICT (product_id, store_id) DO NOTHING
                    "#,
                )
                .bind(key.product_id)
                .bind(key.store_id)
                .bind(import_defaults.min_stock)
                .bind(import_defaults.max_stock)
                .bind(at)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    UPDATE stock_entries
                    SET quantity = quantity + $3, updated_at = $4
                    WHERE product_id = $1 AND store_id = $2
                    "#,
                )
                .bind(key.product_id)
                .bind(key.store_id)
                .bind(*delta)
                .bind(at)
                .execute(&mut *tx)
                .await?;
            } else {
                let requested = delta.saturating_neg();
                let result = sqlx::query(
                    r#"
                    UPDATE stock_entries
                    SET quantity = quantity - $3, updated_at = $4
                    WHERE product_id = $1 AND store_id = $2 AND quantity >= $3
                    "#,
                )
                .bind(key.product_id)
                .bind(key.store_id)
                .bind(requested)
                .bind(at)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() != 1 {
                    tx.rollback().await?;
                    return Err(AppError::InsufficientStock(StockShortfall {
                        product_id: key.product_id,
                        store_id: key.store_id,
                        available: available_at(key),
                        requested,
                    }));
                }
            }
        }

        Self::write_status(&mut tx, &header).await?;
        tx.commit().await?;
        Ok(header)
    }

    async fn lines_for(&self, document_ids: &[i64]) -> AppResult<Vec<DocumentLine>> {
        if document_ids.is_empty() {
            return Ok(vec![]);
        }
        let ids = distinct_ids(document_ids.iter().copied());
        let sql = format!(
            "SELECT {} FROM inventory_document_lines WHERE document_id = ANY($1) ORDER BY document_id, id",
            LINE_COLUMNS
        );
        let lines = sqlx::query_as::<_, LineRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.db)
            .await?;
        Ok(lines.into_iter().map(DocumentLine::from).collect())
    }

    async fn check_lines_for(&self, document_ids: &[i64]) -> AppResult<Vec<CheckLine>> {
        if document_ids.is_empty() {
            return Ok(vec![]);
        }
        let ids = distinct_ids(document_ids.iter().copied());
        let sql = format!(
            "SELECT {} FROM inventory_check_lines WHERE document_id = ANY($1) ORDER BY document_id, id",
            CHECK_LINE_COLUMNS
        );
        let lines = sqlx::query_as::<_, CheckLineRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.db)
            .await?;
        Ok(lines.into_iter().map(CheckLine::from).collect())
    }

    async fn totals_for(&self, document_ids: &[i64]) -> AppResult<HashMap<i64, Decimal>> {
        if document_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = distinct_ids(document_ids.iter().copied());
        let rows = sqlx::query_as::<_, (i64, Decimal)>(
            r#"
            SELECT document_id,
                   COALESCE(SUM(
                       unit_price * quantity *
                       CASE WHEN COALESCE(discount_percent, 0) > 0
                            THEN 1 - ROUND(discount_percent / 100, 4)
                            ELSE 1
                       END
                   ), 0) AS total
            FROM inventory_document_lines
            WHERE document_id = ANY($1)
            GROUP BY document_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn search_offset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<DocumentHeader>, u64)> {
        let (from, to) = filter.date_bounds();
        let code = filter.code_fragment().map(like_pattern);
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM inventory_documents WHERE {}",
            SEARCH_PREDICATE
        ))
        .bind(kind.as_str())
        .bind(status)
        .bind(&code)
        .bind(filter.store_id)
        .bind(from)
        .bind(to)
        .bind(filter.order_id)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            r#"
            SELECT {} FROM inventory_documents
            WHERE {}
            ORDER BY document_date DESC, id DESC
            LIMIT $8 OFFSET $9
            "#,
            DOCUMENT_COLUMNS, SEARCH_PREDICATE
        );
        let headers = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(kind.as_str())
            .bind(status)
            .bind(&code)
            .bind(filter.store_id)
            .bind(from)
            .bind(to)
            .bind(filter.order_id)
            .bind(to_i64(pagination.limit()))
            .bind(to_i64(pagination.offset()))
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(DocumentHeader::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((headers, u64::try_from(total).unwrap_or(0)))
    }

    async fn search_keyset(
        &self,
        kind: DocumentKind,
        filter: &DocumentFilter,
        cursor: Option<KeysetCursor>,
        limit: u32,
    ) -> AppResult<Vec<DocumentHeader>> {
        let (from, to) = filter.date_bounds();
        let code = filter.code_fragment().map(like_pattern);

        let sql = format!(
            r#"
            SELECT {} FROM inventory_documents
            WHERE {}
              AND ($8::timestamptz IS NULL
                   OR document_date < $8
                   OR (document_date = $8 AND id < $9))
            ORDER BY document_date DESC, id DESC
            LIMIT $10
            "#,
            DOCUMENT_COLUMNS, SEARCH_PREDICATE
        );
        sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(kind.as_str())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(&code)
            .bind(filter.store_id)
            .bind(from)
            .bind(to)
            .bind(filter.order_id)
            .bind(cursor.map(|c| c.last_date))
            .bind(cursor.map(|c| c.last_id))
            .bind(i64::from(limit))
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(DocumentHeader::try_from)
            .collect()
    }

    async fn stores_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, StoreRef>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = distinct_ids(ids.iter().copied());
        let stores = sqlx::query_as::<_, StoreRef>(
            "SELECT id, code, name FROM stores WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;
        Ok(stores.into_iter().map(|s| (s.id, s)).collect())
    }

    async fn stock_entry(
        &self,
        key: StockKey,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry> {
        sqlx::query(
            r#"
            INSERT INTO stock_entries (product_id, store_id, quantity, min_stock, max_stock)
            VALUES ($1, $2, 0, $3, $4)
            ON CONFLICT (product_id, store_id) DO NOTHING
            "#,
        )
        .bind(key.product_id)
        .bind(key.store_id)
        .bind(defaults.min_stock)
        .bind(defaults.max_stock)
        .execute(&self.db)
        .await?;

        let sql = format!(
            "SELECT {} FROM stock_entries WHERE product_id = $1 AND store_id = $2",
            STOCK_COLUMNS
        );
        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(key.product_id)
            .bind(key.store_id)
            .fetch_one(&self.db)
            .await?;
        Ok(row.into())
    }

    async fn apply_import(
        &self,
        key: StockKey,
        quantity: i64,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry> {
        let sql = format!(
            r#"
            INSERT INTO stock_entries (product_id, store_id, quantity, min_stock, max_stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id, store_id)
            DO UPDATE SET quantity = stock_entries.quantity + EXCLUDED.quantity,
                          updated_at = NOW()
            WHERE stock_entries.quantity <= $6 - EXCLUDED.quantity
            RETURNING {}
            "#,
            STOCK_COLUMNS
        );
        // No row back means the sum would leave the bigint range
        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(key.product_id)
            .bind(key.store_id)
            .bind(quantity)
            .bind(defaults.min_stock)
            .bind(defaults.max_stock)
            .bind(i64::MAX)
            .fetch_optional(&self.db)
            .await?
            .ok_or(QuantityOverflow::at(key))?;
        Ok(row.into())
    }

    async fn apply_export(&self, key: StockKey, quantity: i64) -> AppResult<StockEntry> {
        let sql = format!(
            r#"
            UPDATE stock_entries
            SET quantity = quantity - $3, updated_at = NOW()
            WHERE product_id = $1 AND store_id = $2 AND quantity >= $3
            RETURNING {}
            "#,
            STOCK_COLUMNS
        );
        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(key.product_id)
            .bind(key.store_id)
            .bind(quantity)
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(AppError::InsufficientStock(StockShortfall {
                product_id: key.product_id,
                store_id: key.store_id,
                available: self.current_quantity(key).await?,
                requested: quantity,
            })),
        }
    }

    async fn upsert_stock(
        &self,
        upsert: StockUpsert,
        defaults: StockThresholds,
    ) -> AppResult<StockEntry> {
        let sql = format!(
            r#"
            INSERT INTO stock_entries (product_id, store_id, quantity, min_stock, max_stock)
            VALUES ($1, $2, COALESCE($3, 0), COALESCE($4, $6), COALESCE($5, $7))
            ON CONFLICT (product_id, store_id)
            DO UPDATE SET quantity = COALESCE($3, stock_entries.quantity),
                          min_stock = COALESCE($4, stock_entries.min_stock),
                          max_stock = COALESCE($5, stock_entries.max_stock),
                          updated_at = NOW()
            RETURNING {}
            "#,
            STOCK_COLUMNS
        );
        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(upsert.product_id)
            .bind(upsert.store_id)
            .bind(upsert.quantity)
            .bind(upsert.min_stock)
            .bind(upsert.max_stock)
            .bind(defaults.min_stock)
            .bind(defaults.max_stock)
            .fetch_one(&self.db)
            .await?;
        Ok(row.into())
    }

    async fn stock_page(&self, pagination: Pagination) -> AppResult<(Vec<StockEntry>, u64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_entries")
            .fetch_one(&self.db)
            .await?;

        let sql = format!(
            "SELECT {} FROM stock_entries ORDER BY product_id, store_id LIMIT $1 OFFSET $2",
            STOCK_COLUMNS
        );
        let rows = sqlx::query_as::<_, StockRow>(&sql)
            .bind(to_i64(pagination.limit()))
            .bind(to_i64(pagination.offset()))
            .fetch_all(&self.db)
            .await?;

        Ok((
            rows.into_iter().map(StockEntry::from).collect(),
            u64::try_from(total).unwrap_or(0),
        ))
    }

    async fn stock_by_product(&self, product_id: i64) -> AppResult<Vec<StockEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_entries WHERE product_id = $1 ORDER BY store_id",
            STOCK_COLUMNS
        );
        let rows = sqlx::query_as::<_, StockRow>(&sql)
            .bind(product_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(StockEntry::from).collect())
    }

    async fn stock_by_store(&self, store_id: i64) -> AppResult<Vec<StockEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_entries WHERE store_id = $1 ORDER BY product_id",
            STOCK_COLUMNS
        );
        let rows = sqlx::query_as::<_, StockRow>(&sql)
            .bind(store_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(StockEntry::from).collect())
    }
}
