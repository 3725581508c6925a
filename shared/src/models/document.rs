//! Inventory document models (supplier receipts, customer issuances and
//! inventory checks)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{start_of_day, start_of_next_day};

/// Kind of inventory document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Goods received from a supplier
    Import,
    /// Goods issued to a customer
    Export,
    /// Physical count reconciled against the ledger
    Check,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Import => "IMPORT",
            DocumentKind::Export => "EXPORT",
            DocumentKind::Check => "CHECK",
        }
    }

    /// Prefix of generated document codes
    pub fn code_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Import => "PNNCC",
            DocumentKind::Export => "PXNCC",
            DocumentKind::Check => "BKK",
        }
    }

    /// Status reached when the document is confirmed
    pub fn terminal_status(&self) -> DocumentStatus {
        match self {
            DocumentKind::Import => DocumentStatus::Imported,
            DocumentKind::Export => DocumentStatus::Exported,
            DocumentKind::Check => DocumentStatus::Adjusted,
        }
    }

    /// Checks have no counterparty
    pub fn counterparty_role(&self) -> Option<CounterpartyRole> {
        match self {
            DocumentKind::Import => Some(CounterpartyRole::Supplier),
            DocumentKind::Export => Some(CounterpartyRole::Customer),
            DocumentKind::Check => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Import => write!(f, "import"),
            DocumentKind::Export => write!(f, "export"),
            DocumentKind::Check => write!(f, "inventory check"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMPORT" => Ok(DocumentKind::Import),
            "EXPORT" => Ok(DocumentKind::Export),
            "CHECK" => Ok(DocumentKind::Check),
            other => Err(format!("unknown document kind: {}", other)),
        }
    }
}

/// Status of an inventory document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Imported,
    Exported,
    /// Inventory check applied to the ledger
    Adjusted,
    Rejected,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Approved => "APPROVED",
            DocumentStatus::Imported => "IMPORTED",
            DocumentStatus::Exported => "EXPORTED",
            DocumentStatus::Adjusted => "ADJUSTED",
            DocumentStatus::Rejected => "REJECTED",
            DocumentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Imported
                | DocumentStatus::Exported
                | DocumentStatus::Adjusted
                | DocumentStatus::Rejected
                | DocumentStatus::Cancelled
        )
    }

    /// Whether a document of `kind` can ever be in this status
    pub fn belongs_to(&self, kind: DocumentKind) -> bool {
        match self {
            DocumentStatus::Imported => kind == DocumentKind::Import,
            DocumentStatus::Exported => kind == DocumentKind::Export,
            DocumentStatus::Adjusted => kind == DocumentKind::Check,
            _ => true,
        }
    }

    pub const ALL: [DocumentStatus; 7] = [
        DocumentStatus::Pending,
        DocumentStatus::Approved,
        DocumentStatus::Imported,
        DocumentStatus::Exported,
        DocumentStatus::Adjusted,
        DocumentStatus::Rejected,
        DocumentStatus::Cancelled,
    ];
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DocumentStatus::Pending),
            "APPROVED" => Ok(DocumentStatus::Approved),
            "IMPORTED" => Ok(DocumentStatus::Imported),
            "EXPORTED" => Ok(DocumentStatus::Exported),
            "ADJUSTED" => Ok(DocumentStatus::Adjusted),
            "REJECTED" => Ok(DocumentStatus::Rejected),
            "CANCELLED" => Ok(DocumentStatus::Cancelled),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Actions that move a document through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentAction {
    /// Replace header fields and lines
    Edit,
    Approve,
    Confirm,
    Reject,
    Cancel,
}

impl DocumentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentAction::Edit => "edit",
            DocumentAction::Approve => "approve",
            DocumentAction::Confirm => "confirm",
            DocumentAction::Reject => "reject",
            DocumentAction::Cancel => "cancel",
        }
    }

    pub const ALL: [DocumentAction; 5] = [
        DocumentAction::Edit,
        DocumentAction::Approve,
        DocumentAction::Confirm,
        DocumentAction::Reject,
        DocumentAction::Cancel,
    ];
}

impl fmt::Display for DocumentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role the counterparty plays on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyRole {
    Supplier,
    Customer,
}

impl CounterpartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyRole::Supplier => "supplier",
            CounterpartyRole::Customer => "customer",
        }
    }
}

/// Counterparty details typed in directly instead of looked up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartySnapshot {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Persisted document header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub id: i64,
    pub kind: DocumentKind,
    pub code: String,
    pub status: DocumentStatus,
    pub document_date: DateTime<Utc>,
    pub store_id: i64,
    /// Supplier id for imports, customer id for exports, none for checks
    pub counterparty_id: Option<i64>,
    pub counterparty: CounterpartySnapshot,
    pub order_id: Option<i64>,
    pub note: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<i64>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<i64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Actor of the kind-specific terminal transition (imported / exported)
    pub completed_by: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentHeader {
    /// Every user id recorded in the audit block
    pub fn actor_ids(&self) -> Vec<i64> {
        let mut ids = vec![self.created_by];
        ids.extend(
            [
                self.approved_by,
                self.rejected_by,
                self.cancelled_by,
                self.completed_by,
            ]
            .into_iter()
            .flatten(),
        );
        ids
    }
}

/// Persisted document line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub id: i64,
    pub document_id: i64,
    pub product_id: i64,
    pub store_id: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub discount_percent: Option<Decimal>,
}

/// A validated line ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLine {
    pub product_id: i64,
    pub store_id: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub discount_percent: Option<Decimal>,
}

/// Free-form line as submitted by a client; incomplete rows are skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LineInput {
    pub product_id: Option<i64>,
    pub store_id: Option<i64>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
}

/// Header and lines submitted on create or update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentInput {
    pub code: Option<String>,
    pub store_id: Option<i64>,
    /// Supplier id for imports, customer id for exports
    pub counterparty_id: Option<i64>,
    pub counterparty_name: Option<String>,
    pub counterparty_phone: Option<String>,
    pub counterparty_address: Option<String>,
    pub order_id: Option<i64>,
    pub note: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<String>,
    pub items: Vec<LineInput>,
}

/// Search predicates shared by offset and keyset pagination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
    /// Case-insensitive substring of the document code
    pub code: Option<String>,
    pub store_id: Option<i64>,
    /// Upstream order the movement fulfils
    pub order_id: Option<i64>,
    pub from: Option<NaiveDate>,
    /// Inclusive; the whole day is covered
    pub to: Option<NaiveDate>,
}

impl DocumentFilter {
    /// Half-open `[from 00:00, to + 1 day 00:00)` bounds in UTC
    pub fn date_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            self.from.map(start_of_day),
            self.to.map(start_of_next_day),
        )
    }

    /// Code fragment to search for, ignoring blank input
    pub fn code_fragment(&self) -> Option<&str> {
        self.code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn matches(&self, header: &DocumentHeader) -> bool {
        if let Some(status) = self.status {
            if header.status != status {
                return false;
            }
        }
        if let Some(store_id) = self.store_id {
            if header.store_id != store_id {
                return false;
            }
        }
        if self.order_id.is_some() && header.order_id != self.order_id {
            return false;
        }
        if let Some(fragment) = self.code_fragment() {
            if !header
                .code
                .to_lowercase()
                .contains(&fragment.to_lowercase())
            {
                return false;
            }
        }
        let (from, to) = self.date_bounds();
        if from.is_some_and(|from| header.document_date < from) {
            return false;
        }
        if to.is_some_and(|to| header.document_date >= to) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header(code: &str, date: DateTime<Utc>) -> DocumentHeader {
        DocumentHeader {
            id: 1,
            kind: DocumentKind::Import,
            code: code.to_string(),
            status: DocumentStatus::Pending,
            document_date: date,
            store_id: 7,
            counterparty_id: Some(3),
            counterparty: CounterpartySnapshot::default(),
            order_id: None,
            note: None,
            description: None,
            attachments: vec![],
            created_by: 1,
            created_at: date,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            cancelled_by: None,
            cancelled_at: None,
            completed_by: None,
            completed_at: None,
            updated_at: date,
        }
    }

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!("approved".parse::<DocumentStatus>(), Ok(DocumentStatus::Approved));
        assert_eq!(" EXPORTED ".parse::<DocumentStatus>(), Ok(DocumentStatus::Exported));
        assert!("shipped".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_terminal_status_is_kind_specific() {
        assert_eq!(DocumentKind::Import.terminal_status(), DocumentStatus::Imported);
        assert_eq!(DocumentKind::Export.terminal_status(), DocumentStatus::Exported);
        assert!(!DocumentStatus::Imported.belongs_to(DocumentKind::Export));
        assert!(DocumentStatus::Pending.belongs_to(DocumentKind::Export));
        assert_eq!(DocumentKind::Check.terminal_status(), DocumentStatus::Adjusted);
        assert!(!DocumentStatus::Adjusted.belongs_to(DocumentKind::Import));
        assert_eq!(DocumentKind::Check.counterparty_role(), None);
    }

    #[test]
    fn test_filter_by_order_id() {
        let date = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let mut fulfilling = header("A", date);
        fulfilling.order_id = Some(42);
        let filter = DocumentFilter {
            order_id: Some(42),
            ..Default::default()
        };
        assert!(filter.matches(&fulfilling));
        assert!(!filter.matches(&header("B", date)));
        assert!(DocumentFilter::default().matches(&header("B", date)));
    }

    #[test]
    fn test_filter_code_is_case_insensitive_substring() {
        let date = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let filter = DocumentFilter {
            code: Some("nncc17".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&header("PNNCC1700000000", date)));
        assert!(!filter.matches(&header("PXNCC2700000000", date)));
    }

    #[test]
    fn test_filter_date_range_includes_whole_end_day() {
        let filter = DocumentFilter {
            from: NaiveDate::from_ymd_opt(2025, 3, 10),
            to: NaiveDate::from_ymd_opt(2025, 3, 10),
            ..Default::default()
        };
        let late = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 59).unwrap();
        assert!(filter.matches(&header("A", late)));
        assert!(!filter.matches(&header("A", next)));
        assert!(!filter.matches(&header("A", before)));
    }

    #[test]
    fn test_actor_ids_collects_recorded_actors() {
        let date = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let mut h = header("A", date);
        h.approved_by = Some(2);
        h.completed_by = Some(5);
        assert_eq!(h.actor_ids(), vec![1, 2, 5]);
    }
}
