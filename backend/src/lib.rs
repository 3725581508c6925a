//! Stock ledger service
//!
//! Approval-gated import, export and inventory check documents over a
//! per-(product, store) stock ledger that only moves when a document is
//! confirmed.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use external::{IdentityDirectory, PartyDirectory};
use services::{CheckService, DocumentService, StockService};
use store::LedgerStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub identity: Arc<dyn IdentityDirectory>,
    pub parties: Arc<dyn PartyDirectory>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn documents(&self) -> DocumentService {
        DocumentService::new(
            self.store.clone(),
            self.identity.clone(),
            self.parties.clone(),
            self.config.ledger.clone(),
        )
    }

    pub fn checks(&self) -> CheckService {
        CheckService::new(
            self.store.clone(),
            self.identity.clone(),
            self.config.ledger.clone(),
        )
    }

    pub fn stock(&self) -> StockService {
        StockService::new(self.store.clone(), self.config.ledger.clone())
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Stock Ledger API v1"
}
