//! Stock ledger models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CheckLine, DocumentKind, DocumentLine};

/// Identity of a stock entry. Ordering is used as the lock order on confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: i64,
    pub store_id: i64,
}

impl StockKey {
    pub fn new(product_id: i64, store_id: i64) -> Self {
        Self {
            product_id,
            store_id,
        }
    }
}

/// Current quantity of a product at a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub id: i64,
    pub product_id: i64,
    pub store_id: i64,
    pub quantity: i64,
    /// Informational thresholds, never enforced
    pub min_stock: i64,
    pub max_stock: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockEntry {
    pub fn is_below_minimum(&self) -> bool {
        self.quantity < self.min_stock
    }
}

/// Thresholds given to entries created lazily
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_stock: i64,
    pub max_stock: i64,
}

/// Administrative upsert; absent fields keep their current value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpsert {
    pub product_id: i64,
    pub store_id: i64,
    pub quantity: Option<i64>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
}

/// Export that could not be covered by the current quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: i64,
    pub store_id: i64,
    pub available: i64,
    pub requested: i64,
}

/// A summed or adjusted quantity left the representable range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("quantity for product {product_id} at store {store_id} is out of range")]
pub struct QuantityOverflow {
    pub product_id: i64,
    pub store_id: i64,
}

impl QuantityOverflow {
    pub fn at(key: StockKey) -> Self {
        Self {
            product_id: key.product_id,
            store_id: key.store_id,
        }
    }
}

fn accumulate(
    movements: &mut BTreeMap<StockKey, i64>,
    key: StockKey,
    delta: i64,
) -> Result<(), QuantityOverflow> {
    let slot = movements.entry(key).or_insert(0);
    *slot = slot.checked_add(delta).ok_or(QuantityOverflow::at(key))?;
    Ok(())
}

/// Total quantity per stock key for a set of lines.
///
/// Lines hitting the same key are summed so that validation sees the full
/// demand of a document on each entry.
pub fn aggregate_movements(
    lines: &[DocumentLine],
) -> Result<BTreeMap<StockKey, i64>, QuantityOverflow> {
    let mut movements = BTreeMap::new();
    for line in lines.iter().filter(|l| l.quantity > 0) {
        accumulate(
            &mut movements,
            StockKey::new(line.product_id, line.store_id),
            line.quantity,
        )?;
    }
    Ok(movements)
}

/// Net counted difference per stock key; keys that balance out are dropped
pub fn aggregate_adjustments(
    lines: &[CheckLine],
) -> Result<BTreeMap<StockKey, i64>, QuantityOverflow> {
    let mut adjustments = BTreeMap::new();
    for line in lines {
        accumulate(
            &mut adjustments,
            StockKey::new(line.product_id, line.store_id),
            line.difference(),
        )?;
    }
    adjustments.retain(|_, delta| *delta != 0);
    Ok(adjustments)
}

/// Signed change per stock key that confirming a `kind` document applies.
///
/// Imports add their lines, exports subtract them and checks apply their
/// counted differences. Only the slice matching `kind` is read.
pub fn signed_movements(
    kind: DocumentKind,
    lines: &[DocumentLine],
    counted: &[CheckLine],
) -> Result<BTreeMap<StockKey, i64>, QuantityOverflow> {
    match kind {
        DocumentKind::Import => aggregate_movements(lines),
        DocumentKind::Export => Ok(aggregate_movements(lines)?
            .into_iter()
            .map(|(key, quantity)| (key, -quantity))
            .collect()),
        DocumentKind::Check => aggregate_adjustments(counted),
    }
}

/// First key whose available quantity cannot absorb its (negative) change
pub fn find_shortfall<F>(deltas: &BTreeMap<StockKey, i64>, available: F) -> Option<StockShortfall>
where
    F: Fn(&StockKey) -> i64,
{
    deltas
        .iter()
        .filter(|(_, delta)| **delta < 0)
        .find_map(|(key, delta)| {
            let available = available(key);
            let requested = delta.saturating_neg();
            (available < requested).then_some(StockShortfall {
                product_id: key.product_id,
                store_id: key.store_id,
                available,
                requested,
            })
        })
}

/// Quantity of every key once `deltas` are applied, computed before any write
pub fn planned_quantities<F>(
    deltas: &BTreeMap<StockKey, i64>,
    available: F,
) -> Result<Vec<(StockKey, i64)>, QuantityOverflow>
where
    F: Fn(&StockKey) -> i64,
{
    deltas
        .iter()
        .map(|(key, delta)| {
            available(key)
                .checked_add(*delta)
                .map(|quantity| (*key, quantity))
                .ok_or(QuantityOverflow::at(*key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(product_id: i64, store_id: i64, quantity: i64) -> DocumentLine {
        DocumentLine {
            id: 0,
            document_id: 1,
            product_id,
            store_id,
            quantity,
            unit_price: Decimal::ONE,
            discount_percent: None,
        }
    }

    #[test]
    fn test_aggregate_sums_lines_on_same_key() {
        let lines = vec![line(1, 1, 4), line(1, 1, 3), line(1, 2, 5)];
        let movements = aggregate_movements(&lines).unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[&StockKey::new(1, 1)], 7);
        assert_eq!(movements[&StockKey::new(1, 2)], 5);
    }

    #[test]
    fn test_keys_iterate_in_lock_order() {
        let lines = vec![line(9, 1, 1), line(2, 8, 1), line(2, 3, 1)];
        let keys: Vec<StockKey> = aggregate_movements(&lines).unwrap().into_keys().collect();
        assert_eq!(
            keys,
            vec![StockKey::new(2, 3), StockKey::new(2, 8), StockKey::new(9, 1)]
        );
    }

    #[test]
    fn test_shortfall_uses_aggregated_demand() {
        // Two lines of 6 against 10 in stock fail even though each alone fits
        let lines = [line(1, 1, 6), line(1, 1, 6)];
        let deltas = signed_movements(DocumentKind::Export, &lines, &[]).unwrap();
        let shortfall = find_shortfall(&deltas, |_| 10).unwrap();
        assert_eq!(shortfall.available, 10);
        assert_eq!(shortfall.requested, 12);
        assert!(find_shortfall(&deltas, |_| 12).is_none());
    }

    #[test]
    fn test_imports_never_fall_short() {
        let deltas = signed_movements(DocumentKind::Import, &[line(1, 1, 6)], &[]).unwrap();
        assert_eq!(deltas[&StockKey::new(1, 1)], 6);
        assert!(find_shortfall(&deltas, |_| 0).is_none());
    }

    #[test]
    fn test_overflowing_sum_is_refused() {
        let lines = [line(1, 1, i64::MAX), line(1, 1, 2)];
        assert_eq!(
            aggregate_movements(&lines),
            Err(QuantityOverflow {
                product_id: 1,
                store_id: 1
            })
        );
        assert!(signed_movements(DocumentKind::Export, &lines, &[]).is_err());
    }

    #[test]
    fn test_planned_quantities_refuse_overflow() {
        let deltas = BTreeMap::from([(StockKey::new(1, 1), 5)]);
        assert_eq!(planned_quantities(&deltas, |_| 3), Ok(vec![(StockKey::new(1, 1), 8)]));
        assert!(planned_quantities(&deltas, |_| i64::MAX).is_err());
    }

    #[test]
    fn test_adjustments_net_counted_differences() {
        let counted = |product_id: i64, system: i64, actual: i64| CheckLine {
            id: 0,
            document_id: 1,
            product_id,
            store_id: 1,
            system_quantity: system,
            actual_quantity: actual,
            unit_price: None,
            note: None,
        };
        let lines = [counted(1, 10, 7), counted(2, 4, 6), counted(2, 5, 3), counted(3, 2, 2)];
        let deltas = signed_movements(DocumentKind::Check, &[], &lines).unwrap();
        assert_eq!(deltas, BTreeMap::from([(StockKey::new(1, 1), -3)]));

        let shortfall = find_shortfall(&deltas, |_| 2).unwrap();
        assert_eq!(shortfall.requested, 3);
    }
}
