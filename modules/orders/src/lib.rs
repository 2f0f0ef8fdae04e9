//! # Orders service
//!
//! Order intake over HTTP with reliable order-created event dispatch via a
//! transactional outbox.
//!
//! The intake path writes the order row and its outbox entry in one
//! transaction and acknowledges the client; the background
//! [`dispatcher`] drains the outbox and publishes to the broker through
//! the [`event_bus::EventBus`] seam, retrying with capped exponential
//! backoff until the broker confirms.
//!
//! Delivery is **at-least-once**: outbox leases are advisory timestamps, a
//! lease can expire while a publish is in flight, and the dispatcher may
//! publish an entry again after a crash. Consumers must deduplicate on
//! `orderId`.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod outbox;
pub mod routes;
pub mod store;

pub use config::{BusType, Config, DispatchConfig};
pub use dispatcher::{run_dispatch_cycle, run_dispatcher, ORDER_CREATED_SUBJECT};
pub use error::OrderError;
pub use models::{CreateOrderRequest, CreateOrderResponse, NewOrder, Order, OrderCreatedPayload};
pub use routes::{create_order_with_event, orders_router};
