//! Document value calculation
//!
//! A line is worth `unit_price * quantity`, reduced by its discount when one
//! is present and positive. The discount fraction is rounded to four decimal
//! places (half-up) before it is applied; nothing else is rounded.
//!
//! Lines reach these functions only after the bounds in
//! [`crate::validation`] are enforced, which keeps every product and sum
//! inside `Decimal` range.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{DocumentLine, NewLine};

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Anything carrying a price, a quantity and an optional discount
pub trait PricedLine {
    fn unit_price(&self) -> Decimal;
    fn quantity(&self) -> i64;
    fn discount_percent(&self) -> Option<Decimal>;

    fn total(&self) -> Decimal {
        line_total(self.unit_price(), self.quantity(), self.discount_percent())
    }
}

impl PricedLine for DocumentLine {
    fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    fn quantity(&self) -> i64 {
        self.quantity
    }

    fn discount_percent(&self) -> Option<Decimal> {
        self.discount_percent
    }
}

impl PricedLine for NewLine {
    fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    fn quantity(&self) -> i64 {
        self.quantity
    }

    fn discount_percent(&self) -> Option<Decimal> {
        self.discount_percent
    }
}

/// `1 - round(discount / 100, 4)`
pub fn discount_multiplier(discount_percent: Decimal) -> Decimal {
    let fraction = (discount_percent / ONE_HUNDRED)
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    Decimal::ONE - fraction
}

pub fn line_total(unit_price: Decimal, quantity: i64, discount_percent: Option<Decimal>) -> Decimal {
    let gross = unit_price * Decimal::from(quantity);
    match discount_percent {
        Some(d) if d > Decimal::ZERO => gross * discount_multiplier(d),
        _ => gross,
    }
}

pub fn document_total<L: PricedLine>(lines: &[L]) -> Decimal {
    lines.iter().map(PricedLine::total).sum()
}

/// Totals keyed by document id, computed in a single pass over the lines
pub fn batch_totals(lines: &[DocumentLine]) -> HashMap<i64, Decimal> {
    let mut totals: HashMap<i64, Decimal> = HashMap::new();
    for line in lines {
        *totals.entry(line.document_id).or_insert(Decimal::ZERO) += line.total();
    }
    totals
}
