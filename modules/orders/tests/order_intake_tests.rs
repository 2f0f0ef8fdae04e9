//! Intake path tests
//!
//! Verify the atomicity of the order + outbox write and the HTTP contract
//! of the intake routes, against an in-process SQLite database.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::util::ServiceExt;
use uuid::Uuid;

use orders_rs::outbox::OutboxStatus;
use orders_rs::{create_order_with_event, orders_router, NewOrder, OrderError};

async fn setup_test_db() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn new_order(amount: f64) -> NewOrder {
    NewOrder {
        order_id: Uuid::new_v4().to_string(),
        customer_id: "cust-42".to_string(),
        amount,
    }
}

async fn order_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn outbox_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM events_outbox")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn create_order_persists_order_and_exactly_one_outbox_entry() {
    let pool = setup_test_db().await;

    let order = new_order(100.0);
    let stored = create_order_with_event(pool.clone(), order.clone())
        .await
        .expect("intake should succeed");

    assert_eq!(stored.order_id, order.order_id);
    assert_eq!(stored.amount, 100.0);

    let fetched = orders_rs::store::fetch_order(&pool, &order.order_id)
        .await
        .unwrap()
        .expect("order must be readable after 201");
    assert_eq!(fetched.customer_id, "cust-42");
    assert_eq!(fetched.amount, 100.0);

    let entries: Vec<orders_rs::outbox::OutboxEntry> =
        sqlx::query_as("SELECT * FROM events_outbox WHERE order_id = $1")
            .bind(&order.order_id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(entries.len(), 1, "exactly one outbox entry per order");
    assert_eq!(entries[0].status, OutboxStatus::Pending);
    assert_eq!(entries[0].attempts, 0);

    // The staged payload is the published wire contract.
    let payload: serde_json::Value = serde_json::from_str(&entries[0].payload).unwrap();
    assert_eq!(payload["orderId"], order.order_id.as_str());
    assert_eq!(payload["amount"], 100.0);
    assert_eq!(payload["customer"]["id"], "cust-42");
}

#[tokio::test]
async fn negative_amount_creates_no_order_and_no_outbox_entry() {
    let pool = setup_test_db().await;

    let result = create_order_with_event(pool.clone(), new_order(-5.0)).await;
    assert!(matches!(result, Err(OrderError::Validation(_))));

    assert_eq!(order_count(&pool).await, 0);
    assert_eq!(outbox_count(&pool).await, 0);
}

#[tokio::test]
async fn nan_amount_is_rejected() {
    let pool = setup_test_db().await;

    let result = create_order_with_event(pool.clone(), new_order(f64::NAN)).await;
    assert!(matches!(result, Err(OrderError::Validation(_))));
    assert_eq!(order_count(&pool).await, 0);
}

#[tokio::test]
async fn duplicate_order_id_conflicts_without_partial_state() {
    let pool = setup_test_db().await;

    let order = new_order(10.0);
    create_order_with_event(pool.clone(), order.clone())
        .await
        .unwrap();

    let result = create_order_with_event(pool.clone(), order.clone()).await;
    assert!(matches!(result, Err(OrderError::Conflict(_))));

    assert_eq!(order_count(&pool).await, 1);
    assert_eq!(outbox_count(&pool).await, 1);
}

#[tokio::test]
async fn post_orders_returns_201_with_order_id() {
    let pool = setup_test_db().await;
    let app = orders_router(pool.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"amount": 100, "customerId": "cust-7"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let order_id = json["orderId"].as_str().expect("201 body carries the id");

    let stored = orders_rs::store::fetch_order(&pool, order_id)
        .await
        .unwrap()
        .expect("acknowledged order must be durable");
    assert_eq!(stored.amount, 100.0);
    assert_eq!(stored.customer_id, "cust-7");
    assert_eq!(outbox_count(&pool).await, 1);
}

#[tokio::test]
async fn post_orders_rejects_negative_amount() {
    let pool = setup_test_db().await;
    let app = orders_router(pool.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"amount": -5, "customerId": "cust-7"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order_count(&pool).await, 0);
    assert_eq!(outbox_count(&pool).await, 0);
}

#[tokio::test]
async fn post_orders_requires_customer_id() {
    let pool = setup_test_db().await;
    let app = orders_router(pool.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"amount": 5}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(order_count(&pool).await, 0);
}

#[tokio::test]
async fn get_order_round_trips_and_unknown_id_is_404() {
    let pool = setup_test_db().await;
    let order = new_order(42.5);
    create_order_with_event(pool.clone(), order.clone())
        .await
        .unwrap();

    let app = orders_router(pool.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/orders/{}", order.order_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["orderId"], order.order_id.as_str());
    assert_eq!(json["amount"], 42.5);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/orders/no-such-order")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let pool = setup_test_db().await;
    let app = orders_router(pool);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}
