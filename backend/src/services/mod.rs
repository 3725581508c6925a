//! Business logic services for the stock ledger

pub mod check;
pub mod document;
pub mod stock;

pub use check::CheckService;
pub use document::DocumentService;
pub use stock::StockService;
