use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST / RESPONSE BODIES
// ============================================================================

/// Body for POST /orders
///
/// `customerId` is a required caller-supplied reference; the service does
/// not invent one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: f64,
    pub customer_id: String,
}

/// 201 response body for POST /orders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// ============================================================================
// DOMAIN RECORDS
// ============================================================================

/// A stored order. Immutable after creation: nothing in the service updates
/// or deletes order rows.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// An order as submitted by the intake handler, before it is persisted.
/// The id is generated at request time so the caller gets it back even
/// though the store assigns nothing further.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
}

// ============================================================================
// OUTGOING EVENT PAYLOAD
// ============================================================================

/// Wire form of the order-created event, as serialized into the outbox and
/// published to the broker verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedPayload {
    pub order_id: String,
    pub amount: f64,
    pub customer: CustomerRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: String,
}

impl From<&Order> for OrderCreatedPayload {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            amount: order.amount,
            customer: CustomerRef {
                id: order.customer_id.clone(),
            },
        }
    }
}
