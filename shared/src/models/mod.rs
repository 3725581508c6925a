//! Domain models for the stock ledger

mod check;
mod document;
mod stock;

pub use check::*;
pub use document::*;
pub use stock::*;
