//! HTTP API tests
//!
//! Drives the router end to end over the in-memory store:
//! - acting user header handling
//! - status codes for each error class
//! - a full import/export round through the routes

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use common::*;
use ledger_server::{
    create_app,
    services::{check::CheckView, document::DocumentView, stock::StockView},
};
use serde_json::{json, Value};
use shared::DocumentStatus;
use tower::ServiceExt;

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    actor: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-user-id", actor.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn error_code(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["error"]["code"].as_str().unwrap_or_default().to_string()
}

fn import_body(quantity: i64) -> Value {
    json!({
        "store_id": MAIN_STORE,
        "counterparty_id": SUPPLIER,
        "note": "weekly delivery",
        "attachments": ["files/invoice.pdf", "  "],
        "items": [
            { "product_id": 1, "quantity": quantity, "unit_price": "1000" },
            { "product_id": 2, "quantity": 5, "unit_price": "2000", "discount_percent": "10" }
        ]
    })
}

fn export_body(quantity: i64) -> Value {
    json!({
        "store_id": MAIN_STORE,
        "counterparty_name": "Walk-in Customer",
        "items": [
            { "product_id": 1, "quantity": quantity, "unit_price": "1500" }
        ]
    })
}

// ============================================================================
// Acting user
// ============================================================================

#[tokio::test]
async fn test_mutation_without_actor_is_unauthorized() {
    let app = create_app(Harness::new().state);

    let (status, body) = send(&app, Method::POST, "/api/v1/imports", None, Some(import_body(1))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_malformed_actor_is_unauthorized() {
    let app = create_app(Harness::new().state);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/imports/1/approve")
        .header("x-user-id", "abc")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reads_do_not_need_actor() {
    let app = create_app(Harness::new().state);

    let (status, _) = send(&app, Method::GET, "/api/v1/imports", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Document flow
// ============================================================================

#[tokio::test]
async fn test_import_round_through_routes() {
    let app = create_app(Harness::new().state);

    let (status, body) = send(&app, Method::POST, "/api/v1/imports", Some(CLERK), Some(import_body(10))).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.status, DocumentStatus::Pending);
    assert_eq!(created.total, dec("19000"));
    assert_eq!(created.attachments, vec!["/files/invoice.pdf".to_string()]);

    let uri = format!("/api/v1/imports/{}/confirm", created.id);
    let (status, body) = send(&app, Method::POST, &uri, Some(MANAGER), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "INVALID_STATE_TRANSITION");

    let uri = format!("/api/v1/imports/{}/approve", created.id);
    let (status, _) = send(&app, Method::POST, &uri, Some(MANAGER), None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/v1/imports/{}/confirm", created.id);
    let (status, body) = send(&app, Method::POST, &uri, Some(MANAGER), None).await;
    assert_eq!(status, StatusCode::OK);
    let confirmed: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(confirmed.status, DocumentStatus::Imported);

    let (status, body) = send(&app, Method::GET, "/api/v1/stocks/product/1/store/1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let entry: StockView = serde_json::from_slice(&body).unwrap();
    assert_eq!(entry.quantity, 10);
}

#[tokio::test]
async fn test_export_short_of_stock_is_unprocessable() {
    let harness = Harness::new();
    harness.seed_stock(1, MAIN_STORE, 10).await;
    let app = create_app(harness.state.clone());

    let (_, body) = send(&app, Method::POST, "/api/v1/exports", Some(CLERK), Some(export_body(20))).await;
    let created: DocumentView = serde_json::from_slice(&body).unwrap();
    let uri = format!("/api/v1/exports/{}/approve", created.id);
    send(&app, Method::POST, &uri, Some(MANAGER), None).await;

    let uri = format!("/api/v1/exports/{}/confirm", created.id);
    let (status, body) = send(&app, Method::POST, &uri, Some(MANAGER), None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "INSUFFICIENT_STOCK");

    let uri = format!("/api/v1/exports/{}", created.id);
    let (_, body) = send(&app, Method::GET, &uri, None, None).await;
    let current: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(current.status, DocumentStatus::Approved);
    assert_eq!(harness.quantity(1, MAIN_STORE).await, 10);
}

#[tokio::test]
async fn test_inventory_check_round_through_routes() {
    let harness = Harness::new();
    harness.seed_stock(1, MAIN_STORE, 10).await;
    let app = create_app(harness.state.clone());
    let body = json!({
        "store_id": MAIN_STORE,
        "items": [
            { "product_id": 1, "system_quantity": 10, "actual_quantity": 7, "unit_price": "2" }
        ]
    });

    let (status, body) = send(&app, Method::POST, "/api/v1/inventory-checks", Some(CLERK), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: CheckView = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.total_difference_value, dec("-6"));

    for action in ["approve", "confirm"] {
        let uri = format!("/api/v1/inventory-checks/{}/{}", created.id, action);
        let (status, _) = send(&app, Method::POST, &uri, Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let uri = format!("/api/v1/inventory-checks/{}", created.id);
    let (_, body) = send(&app, Method::GET, &uri, None, None).await;
    let current: CheckView = serde_json::from_slice(&body).unwrap();
    assert_eq!(current.status, DocumentStatus::Adjusted);
    assert_eq!(harness.quantity(1, MAIN_STORE).await, 7);

    let (status, _) = send(&app, Method::GET, "/api/v1/imports/1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_filter_through_routes() {
    let app = create_app(Harness::new().state);
    let mut body = import_body(1);
    body["order_id"] = json!(31);
    send(&app, Method::POST, "/api/v1/imports", Some(CLERK), Some(body)).await;
    send(&app, Method::POST, "/api/v1/imports", Some(CLERK), Some(import_body(2))).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/imports?order_id=31", None, None).await;

    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["pagination"]["total_items"], json!(1));
    assert_eq!(page["data"][0]["order_id"], json!(31));
}

#[tokio::test]
async fn test_reject_accepts_missing_body() {
    let app = create_app(Harness::new().state);
    let (_, body) = send(&app, Method::POST, "/api/v1/imports", Some(CLERK), Some(import_body(1))).await;
    let created: DocumentView = serde_json::from_slice(&body).unwrap();

    let uri = format!("/api/v1/imports/{}/reject", created.id);
    let (status, body) = send(&app, Method::POST, &uri, Some(MANAGER), None).await;

    assert_eq!(status, StatusCode::OK);
    let rejected: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(rejected.status, DocumentStatus::Rejected);
    assert_eq!(rejected.note.as_deref(), Some("weekly delivery"));
}

#[tokio::test]
async fn test_reject_with_reason_replaces_note() {
    let app = create_app(Harness::new().state);
    let (_, body) = send(&app, Method::POST, "/api/v1/imports", Some(CLERK), Some(import_body(1))).await;
    let created: DocumentView = serde_json::from_slice(&body).unwrap();

    let uri = format!("/api/v1/imports/{}/reject", created.id);
    let (_, body) = send(&app, Method::POST, &uri, Some(MANAGER), Some(json!({ "reason": "damaged" }))).await;

    let rejected: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(rejected.note.as_deref(), Some("damaged"));
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn test_unknown_document_is_not_found() {
    let app = create_app(Harness::new().state);

    let (status, body) = send(&app, Method::GET, "/api/v1/exports/999", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

#[tokio::test]
async fn test_bad_status_filter_is_a_validation_error() {
    let app = create_app(Harness::new().state);

    let (status, body) = send(&app, Method::GET, "/api/v1/imports?status=SHIPPED", None, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_keyset_cursor_needs_both_parts() {
    let app = create_app(Harness::new().state);

    let (status, _) = send(&app, Method::GET, "/api/v1/imports/keyset?last_id=5", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/v1/imports/keyset?size=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let page: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["has_more"], json!(false));
}

#[tokio::test]
async fn test_stock_upsert_validates_and_requires_actor() {
    let app = create_app(Harness::new().state);
    let body = json!({ "product_id": 3, "store_id": MAIN_STORE, "quantity": 4 });

    let (status, _) = send(&app, Method::POST, "/api/v1/stocks", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, response) = send(&app, Method::POST, "/api/v1/stocks", Some(MANAGER), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let entry: StockView = serde_json::from_slice(&response).unwrap();
    assert_eq!(entry.quantity, 4);

    let negative = json!({ "product_id": 3, "store_id": MAIN_STORE, "quantity": -1 });
    let (status, _) = send(&app, Method::POST, "/api/v1/stocks", Some(MANAGER), Some(negative)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
