//! Shared types and models for the stock ledger service
//!
//! This crate contains the domain types, lifecycle rules and pure
//! calculations used by the backend and by any client of its API.

pub mod lifecycle;
pub mod models;
pub mod totals;
pub mod types;
pub mod validation;

pub use lifecycle::*;
pub use models::*;
pub use totals::*;
pub use types::*;
pub use validation::*;
