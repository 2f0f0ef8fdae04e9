use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{CreateOrderRequest, CreateOrderResponse, NewOrder, Order, OrderCreatedPayload};
use crate::outbox;
use crate::store;

pub fn orders_router(db: SqlitePool) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/health", get(health))
        .with_state(db)
}

/// POST /orders - accept an order and stage its creation event
///
/// The handler only waits on the atomic storage write; it never talks to
/// the broker, so request latency is independent of broker health.
async fn create_order(
    State(db): State<SqlitePool>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), OrderError> {
    let order_id = Uuid::new_v4().to_string();
    let order = NewOrder {
        order_id: order_id.clone(),
        customer_id: req.customer_id,
        amount: req.amount,
    };

    // Run the write on its own task: a client disconnect drops this handler
    // future, but the write, once started, must not be abandoned.
    tokio::spawn(create_order_with_event(db, order))
        .await
        .map_err(|e| OrderError::Internal(format!("intake task failed: {e}")))??;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse { order_id }),
    ))
}

/// Persist an order and its outbox entry as one atomic unit.
///
/// No partial state survives a failure: either both rows commit or
/// neither does. Publishing is left entirely to the dispatcher.
pub async fn create_order_with_event(
    db: SqlitePool,
    order: NewOrder,
) -> Result<Order, OrderError> {
    let mut tx = db.begin().await?;

    let stored = store::insert_order(&mut tx, &order).await?;
    let payload = OrderCreatedPayload::from(&stored);
    outbox::enqueue(&mut tx, &stored.order_id, &payload).await?;

    tx.commit().await?;

    tracing::info!(
        order_id = %stored.order_id,
        customer_id = %stored.customer_id,
        amount = stored.amount,
        "Order stored, creation event staged"
    );

    Ok(stored)
}

/// GET /orders/{id}
async fn get_order(
    State(db): State<SqlitePool>,
    Path(id): Path<String>,
) -> Result<Json<Order>, OrderError> {
    let order = store::fetch_order(&db, &id)
        .await?
        .ok_or_else(|| OrderError::NotFound(id))?;
    Ok(Json(order))
}

/// GET /health - liveness probe for the load balancer
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "orders",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
