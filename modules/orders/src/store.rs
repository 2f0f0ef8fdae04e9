//! Append-only order store
//!
//! Insert runs against a caller-supplied transaction so the order row and
//! its outbox entry commit atomically (see [`crate::routes`]).

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::OrderError;
use crate::models::{NewOrder, Order};

/// Insert a new order within the given transaction.
///
/// Fails with `Validation` for a negative (or non-finite) amount and with
/// `Conflict` when the id is already taken, which should not happen under
/// UUID generation and indicates a generation bug if it does.
pub async fn insert_order(
    tx: &mut Transaction<'_, Sqlite>,
    order: &NewOrder,
) -> Result<Order, OrderError> {
    if !order.amount.is_finite() || order.amount < 0.0 {
        return Err(OrderError::Validation(format!(
            "amount must be a non-negative number, got {}",
            order.amount
        )));
    }

    let created_at = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO orders (order_id, customer_id, amount, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(order.amount)
    .bind(created_at)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(Order {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            amount: order.amount,
            created_at,
        }),
        Err(e) if is_unique_violation(&e) => Err(OrderError::Conflict(order.order_id.clone())),
        Err(e) => Err(e.into()),
    }
}

/// Fetch an order by id. Returns `None` when no such order exists.
pub async fn fetch_order(pool: &SqlitePool, order_id: &str) -> Result<Option<Order>, OrderError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        SELECT order_id, customer_id, amount, created_at
        FROM orders
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    Ok(order)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
