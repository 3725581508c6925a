//! Route definitions for the stock ledger service

use axum::{
    routing::{get, post},
    Extension, Router,
};
use shared::DocumentKind;

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Supplier receipts
        .nest("/imports", document_routes(DocumentKind::Import))
        // Customer issuances
        .nest("/exports", document_routes(DocumentKind::Export))
        // Physical counts reconciled against the ledger
        .nest("/inventory-checks", check_routes())
        // Stock ledger
        .nest("/stocks", stock_routes())
}

/// Document routes, shared by both kinds
fn document_routes(kind: DocumentKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::create_document).get(handlers::search_documents),
        )
        .route("/keyset", get(handlers::search_documents_keyset))
        .route(
            "/:id",
            get(handlers::get_document).put(handlers::update_document),
        )
        .route("/:id/approve", post(handlers::approve_document))
        .route("/:id/confirm", post(handlers::confirm_document))
        .route("/:id/reject", post(handlers::reject_document))
        .route("/:id/cancel", post(handlers::cancel_document))
        .layer(Extension(kind))
}

/// Inventory check routes; a pending check is withdrawn with cancel
fn check_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_check).get(handlers::search_checks))
        .route("/keyset", get(handlers::search_checks_keyset))
        .route("/:id", get(handlers::get_check).put(handlers::update_check))
        .route("/:id/approve", post(handlers::approve_check))
        .route("/:id/confirm", post(handlers::confirm_check))
        .route("/:id/reject", post(handlers::reject_check))
        .route("/:id/cancel", post(handlers::cancel_check))
}

/// Stock ledger routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_stock).post(handlers::upsert_stock))
        .route("/product/:product_id", get(handlers::get_stock_by_product))
        .route(
            "/product/:product_id/store/:store_id",
            get(handlers::get_stock),
        )
        .route("/store/:store_id", get(handlers::get_stock_by_store))
}
