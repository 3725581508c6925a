//! HTTP handlers

pub mod checks;
pub mod documents;
pub mod health;
pub mod stock;

pub use checks::*;
pub use documents::*;
pub use health::*;
pub use stock::*;
