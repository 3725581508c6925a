//! Inventory check models (physical counts reconciled against the ledger)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persisted counted line of an inventory check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckLine {
    pub id: i64,
    pub document_id: i64,
    pub product_id: i64,
    pub store_id: i64,
    /// Quantity the ledger reported when the count was taken
    pub system_quantity: i64,
    /// Quantity found on the shelf
    pub actual_quantity: i64,
    pub unit_price: Option<Decimal>,
    pub note: Option<String>,
}

impl CheckLine {
    /// Signed stock change confirming this line applies
    pub fn difference(&self) -> i64 {
        counted_difference(self.system_quantity, self.actual_quantity)
    }

    /// Value of the difference at the line's unit price
    pub fn difference_value(&self) -> Option<Decimal> {
        difference_value(self.unit_price, self.difference())
    }
}

/// A validated counted line ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCheckLine {
    pub product_id: i64,
    pub store_id: i64,
    pub system_quantity: i64,
    pub actual_quantity: i64,
    pub unit_price: Option<Decimal>,
    pub note: Option<String>,
}

impl NewCheckLine {
    pub fn difference(&self) -> i64 {
        counted_difference(self.system_quantity, self.actual_quantity)
    }
}

/// Counted row as submitted by a client; rows without both counts are skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckLineInput {
    pub product_id: Option<i64>,
    pub store_id: Option<i64>,
    pub system_quantity: Option<i64>,
    pub actual_quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    pub note: Option<String>,
}

/// Header and counted lines submitted on create or update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckInput {
    pub code: Option<String>,
    pub store_id: Option<i64>,
    pub note: Option<String>,
    pub description: Option<String>,
    pub attachments: Vec<String>,
    pub items: Vec<CheckLineInput>,
}

/// Both counts are bounded on input, so the subtraction cannot overflow
fn counted_difference(system_quantity: i64, actual_quantity: i64) -> i64 {
    actual_quantity.saturating_sub(system_quantity)
}

fn difference_value(unit_price: Option<Decimal>, difference: i64) -> Option<Decimal> {
    unit_price.and_then(|price| price.checked_mul(Decimal::from(difference)))
}

/// Sum of the valued differences; unpriced lines contribute nothing
pub fn check_total(lines: &[CheckLine]) -> Decimal {
    lines
        .iter()
        .filter_map(CheckLine::difference_value)
        .fold(Decimal::ZERO, |total, value| total.saturating_add(value))
}
