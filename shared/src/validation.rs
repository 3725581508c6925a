//! Input validation and normalization for inventory documents

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{CheckLineInput, DocumentKind, LineInput, NewCheckLine, NewLine};

/// Default maximum length of a document note, in characters
pub const NOTE_MAX_LENGTH: usize = 255;

/// Largest quantity a single line may move or count
pub const MAX_LINE_QUANTITY: i64 = 1_000_000_000;

/// Largest unit price a line may carry (10^12)
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Most lines a single document may hold
pub const MAX_DOCUMENT_LINES: usize = 1_000;

const UPLOADS_MARKER: &str = "/uploads/";

/// Rejected line item
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("item {index}: discount {value} must be between 0 and 100")]
    DiscountOutOfRange { index: usize, value: Decimal },

    #[error("item {index}: unit price {value} must not be negative")]
    NegativeUnitPrice { index: usize, value: Decimal },

    #[error("item {index}: unit price {value} exceeds {max}", max = MAX_UNIT_PRICE)]
    UnitPriceTooLarge { index: usize, value: Decimal },

    #[error("item {index}: quantity {value} exceeds {max}", max = MAX_LINE_QUANTITY)]
    QuantityTooLarge { index: usize, value: i64 },

    #[error("item {index}: counted quantity {value} must not be negative")]
    NegativeCount { index: usize, value: i64 },

    #[error("a document holds at most {max} items, got {count}", max = MAX_DOCUMENT_LINES)]
    TooManyLines { count: usize },
}

impl LineError {
    /// Name of the offending input field
    pub fn field(&self) -> &'static str {
        match self {
            LineError::DiscountOutOfRange { .. } => "discount_percent",
            LineError::NegativeUnitPrice { .. } | LineError::UnitPriceTooLarge { .. } => {
                "unit_price"
            }
            LineError::QuantityTooLarge { .. } | LineError::NegativeCount { .. } => "quantity",
            LineError::TooManyLines { .. } => "items",
        }
    }
}

// ============================================================================
// Line Items
// ============================================================================

/// Turn submitted items into persistable lines.
///
/// Rows without a product, a positive quantity or a unit price are skipped.
/// A row without its own store takes `default_store_id`. Indices in errors
/// refer to positions in `items`. Quantities and prices are bounded so that
/// totals and stock sums stay in range.
pub fn prepare_lines(items: &[LineInput], default_store_id: i64) -> Result<Vec<NewLine>, LineError> {
    let mut lines = Vec::with_capacity(items.len().min(MAX_DOCUMENT_LINES));

    for (index, item) in items.iter().enumerate() {
        let (Some(product_id), Some(quantity), Some(unit_price)) =
            (item.product_id, item.quantity, item.unit_price)
        else {
            continue;
        };
        if quantity <= 0 {
            continue;
        }

        check_quantity(index, quantity)?;
        check_unit_price(index, unit_price)?;
        if let Some(discount) = item.discount_percent {
            if discount < Decimal::ZERO || discount > Decimal::ONE_HUNDRED {
                return Err(LineError::DiscountOutOfRange {
                    index,
                    value: discount,
                });
            }
        }

        lines.push(NewLine {
            product_id,
            store_id: item.store_id.unwrap_or(default_store_id),
            quantity,
            unit_price,
            discount_percent: item.discount_percent,
        });
    }

    check_line_count(lines.len())?;
    Ok(lines)
}

/// Turn submitted counts into persistable check lines.
///
/// Rows without a product or without both counts are skipped. Counts must be
/// between zero and [`MAX_LINE_QUANTITY`]; the unit price is optional.
pub fn prepare_check_lines(
    items: &[CheckLineInput],
    default_store_id: i64,
) -> Result<Vec<NewCheckLine>, LineError> {
    let mut lines = Vec::with_capacity(items.len().min(MAX_DOCUMENT_LINES));

    for (index, item) in items.iter().enumerate() {
        let (Some(product_id), Some(system_quantity), Some(actual_quantity)) =
            (item.product_id, item.system_quantity, item.actual_quantity)
        else {
            continue;
        };

        for value in [system_quantity, actual_quantity] {
            if value < 0 {
                return Err(LineError::NegativeCount { index, value });
            }
            check_quantity(index, value)?;
        }
        if let Some(unit_price) = item.unit_price {
            check_unit_price(index, unit_price)?;
        }

        lines.push(NewCheckLine {
            product_id,
            store_id: item.store_id.unwrap_or(default_store_id),
            system_quantity,
            actual_quantity,
            unit_price: item.unit_price,
            note: non_blank(item.note.as_deref()).map(str::to_string),
        });
    }

    check_line_count(lines.len())?;
    Ok(lines)
}

fn check_quantity(index: usize, quantity: i64) -> Result<(), LineError> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(LineError::QuantityTooLarge {
            index,
            value: quantity,
        });
    }
    Ok(())
}

fn check_unit_price(index: usize, unit_price: Decimal) -> Result<(), LineError> {
    if unit_price < Decimal::ZERO {
        return Err(LineError::NegativeUnitPrice {
            index,
            value: unit_price,
        });
    }
    if unit_price > MAX_UNIT_PRICE {
        return Err(LineError::UnitPriceTooLarge {
            index,
            value: unit_price,
        });
    }
    Ok(())
}

fn check_line_count(count: usize) -> Result<(), LineError> {
    if count > MAX_DOCUMENT_LINES {
        return Err(LineError::TooManyLines { count });
    }
    Ok(())
}

/// Header store, or the store of the first item that names one
pub fn resolve_store_id(header_store_id: Option<i64>, items: &[LineInput]) -> Option<i64> {
    header_store_id.or_else(|| items.iter().find_map(|item| item.store_id))
}

// ============================================================================
// Header Fields
// ============================================================================

/// Trimmed value, or `None` when blank
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Imports need a supplier id; exports need a customer id or a customer name
pub fn has_counterparty(kind: DocumentKind, counterparty_id: Option<i64>, name: Option<&str>) -> bool {
    match kind {
        DocumentKind::Import => counterparty_id.is_some(),
        DocumentKind::Export => counterparty_id.is_some() || non_blank(name).is_some(),
        DocumentKind::Check => true,
    }
}

/// Cut a note down to `max_chars` characters
pub fn truncate_note(note: &str, max_chars: usize) -> String {
    note.chars().take(max_chars).collect()
}

/// `<prefix><epoch millis>`, e.g. `PNNCC1735689600000`
pub fn generate_document_code(kind: DocumentKind, now: DateTime<Utc>) -> String {
    format!("{}{}", kind.code_prefix(), now.timestamp_millis())
}

// ============================================================================
// Attachments
// ============================================================================

/// Normalize an uploaded file reference to a server-relative path
pub fn normalize_attachment(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if let Some(pos) = reference.find(UPLOADS_MARKER) {
        return Some(reference[pos..].to_string());
    }
    if reference.starts_with('/') {
        Some(reference.to_string())
    } else {
        Some(format!("/{}", reference))
    }
}

pub fn normalize_attachments(references: &[String]) -> Vec<String> {
    references
        .iter()
        .filter_map(|r| normalize_attachment(r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn item(product: Option<i64>, qty: Option<i64>, price: Option<i64>) -> LineInput {
        LineInput {
            product_id: product,
            store_id: None,
            quantity: qty,
            unit_price: price.map(Decimal::from),
            discount_percent: None,
        }
    }

    // ========================================================================
    // Line Item Tests
    // ========================================================================

    #[test]
    fn test_incomplete_items_are_skipped() {
        let items = vec![
            item(Some(1), Some(5), Some(10)),
            item(None, Some(5), Some(10)),
            item(Some(2), Some(0), Some(10)),
            item(Some(3), Some(-4), Some(10)),
            item(Some(4), None, Some(10)),
            item(Some(5), Some(2), None),
        ];
        let lines = prepare_lines(&items, 9).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, 1);
        assert_eq!(lines[0].store_id, 9);
    }

    #[test]
    fn test_line_store_overrides_header_store() {
        let mut own_store = item(Some(1), Some(1), Some(1));
        own_store.store_id = Some(4);
        let lines = prepare_lines(&[own_store], 9).unwrap();
        assert_eq!(lines[0].store_id, 4);
    }

    #[test]
    fn test_discount_out_of_range_is_rejected() {
        let mut bad = item(Some(1), Some(1), Some(1));
        bad.discount_percent = Some(Decimal::from(101));
        let err = prepare_lines(&[item(Some(2), Some(1), Some(1)), bad], 1).unwrap_err();
        assert_eq!(
            err,
            LineError::DiscountOutOfRange {
                index: 1,
                value: Decimal::from(101)
            }
        );
        assert_eq!(err.field(), "discount_percent");
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let err = prepare_lines(&[item(Some(1), Some(1), Some(-1))], 1).unwrap_err();
        assert_eq!(err.field(), "unit_price");
    }

    #[test]
    fn test_oversized_quantity_is_rejected() {
        let err = prepare_lines(&[item(Some(1), Some(i64::MAX), Some(1))], 1).unwrap_err();
        assert_eq!(
            err,
            LineError::QuantityTooLarge {
                index: 0,
                value: i64::MAX
            }
        );
        assert_eq!(err.field(), "quantity");
        assert!(prepare_lines(&[item(Some(1), Some(MAX_LINE_QUANTITY), Some(1))], 1).is_ok());
    }

    #[test]
    fn test_oversized_price_is_rejected() {
        let err = prepare_lines(&[item(Some(1), Some(1), Some(100_000_000_000_000))], 1).unwrap_err();
        assert_eq!(err.field(), "unit_price");
        assert_eq!(MAX_UNIT_PRICE, Decimal::from(1_000_000_000_000_i64));
    }

    #[test]
    fn test_line_count_is_bounded() {
        let items = vec![item(Some(1), Some(1), Some(1)); MAX_DOCUMENT_LINES + 1];
        let err = prepare_lines(&items, 1).unwrap_err();
        assert_eq!(err, LineError::TooManyLines { count: MAX_DOCUMENT_LINES + 1 });
        assert_eq!(err.field(), "items");
    }

    #[test]
    fn test_check_lines_skip_rows_without_both_counts() {
        let counted = |product: Option<i64>, system: Option<i64>, actual: Option<i64>| CheckLineInput {
            product_id: product,
            system_quantity: system,
            actual_quantity: actual,
            note: Some("  ".to_string()),
            ..Default::default()
        };
        let items = vec![
            counted(Some(1), Some(10), Some(7)),
            counted(Some(2), None, Some(7)),
            counted(None, Some(1), Some(1)),
            counted(Some(3), Some(0), Some(0)),
        ];
        let lines = prepare_check_lines(&items, 4).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].difference(), -3);
        assert_eq!(lines[0].store_id, 4);
        assert_eq!(lines[0].note, None);

        let negative = counted(Some(1), Some(-1), Some(0));
        assert_eq!(
            prepare_check_lines(&[negative], 1),
            Err(LineError::NegativeCount { index: 0, value: -1 })
        );
        let huge = counted(Some(1), Some(0), Some(i64::MAX));
        assert_eq!(prepare_check_lines(&[huge], 1).unwrap_err().field(), "quantity");
    }

    #[test]
    fn test_skipped_row_is_not_validated() {
        let mut skipped = item(None, Some(1), Some(1));
        skipped.discount_percent = Some(Decimal::from(500));
        assert!(prepare_lines(&[skipped], 1).unwrap().is_empty());
    }

    #[test]
    fn test_store_falls_back_to_first_item() {
        let mut first = item(Some(1), Some(1), Some(1));
        first.store_id = Some(3);
        let mut second = item(Some(2), Some(1), Some(1));
        second.store_id = Some(8);
        let items = vec![item(Some(9), Some(1), Some(1)), first, second];
        assert_eq!(resolve_store_id(None, &items), Some(3));
        assert_eq!(resolve_store_id(Some(5), &items), Some(5));
        assert_eq!(resolve_store_id(None, &[]), None);
    }

    // ========================================================================
    // Header Field Tests
    // ========================================================================

    #[test]
    fn test_counterparty_requirements() {
        assert!(has_counterparty(DocumentKind::Import, Some(1), None));
        assert!(!has_counterparty(DocumentKind::Import, None, Some("Acme")));
        assert!(has_counterparty(DocumentKind::Export, None, Some("Walk-in")));
        assert!(!has_counterparty(DocumentKind::Export, None, Some("   ")));
        assert!(has_counterparty(DocumentKind::Export, Some(7), None));
        assert!(has_counterparty(DocumentKind::Check, None, None));
    }

    #[test]
    fn test_truncate_note_counts_characters() {
        let note = "é".repeat(300);
        let truncated = truncate_note(&note, NOTE_MAX_LENGTH);
        assert_eq!(truncated.chars().count(), 255);
        assert_eq!(truncate_note("short", NOTE_MAX_LENGTH), "short");
    }

    #[test]
    fn test_generated_code_uses_kind_prefix() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            generate_document_code(DocumentKind::Import, now),
            "PNNCC1735689600000"
        );
        assert!(generate_document_code(DocumentKind::Export, now).starts_with("PXNCC"));
        assert!(generate_document_code(DocumentKind::Check, now).starts_with("BKK"));
    }

    // ========================================================================
    // Attachment Tests
    // ========================================================================

    #[test]
    fn test_normalize_attachment() {
        assert_eq!(
            normalize_attachment("https://cdn.example.com/app/uploads/a.png").as_deref(),
            Some("/uploads/a.png")
        );
        assert_eq!(normalize_attachment("files/b.pdf").as_deref(), Some("/files/b.pdf"));
        assert_eq!(normalize_attachment(" /c.jpg ").as_deref(), Some("/c.jpg"));
        assert_eq!(normalize_attachment("   "), None);
    }

    #[test]
    fn test_normalize_attachments_drops_blanks() {
        let refs = vec!["".to_string(), "x.png".to_string(), " ".to_string()];
        assert_eq!(normalize_attachments(&refs), vec!["/x.png".to_string()]);
    }

    proptest! {
        #[test]
        fn normalized_attachments_are_rooted(reference in "[a-z/ .]{0,40}") {
            if let Some(path) = normalize_attachment(&reference) {
                prop_assert!(path.starts_with('/'));
            }
        }

        #[test]
        fn prepared_lines_are_positive(
            rows in proptest::collection::vec(
                (proptest::option::of(1i64..100), proptest::option::of(-5i64..20), proptest::option::of(0i64..500)),
                0..20
            )
        ) {
            let items: Vec<LineInput> = rows
                .into_iter()
                .map(|(product, qty, price)| item(product, qty, price))
                .collect();
            let lines = prepare_lines(&items, 1).unwrap();
            prop_assert!(lines.iter().all(|l| l.quantity > 0 && l.quantity <= MAX_LINE_QUANTITY));
        }
    }
}
