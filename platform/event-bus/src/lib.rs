//! # EventBus
//!
//! The seam between the order service and its message broker.
//!
//! The intake path never talks to the broker; only the outbox dispatcher
//! does, and it does so exclusively through the [`EventBus`] trait. That
//! keeps broker choice a deployment decision (`BUS_TYPE` env var) and lets
//! every dispatcher test run against [`InMemoryBus`] with no server.
//!
//! ## Implementations
//!
//! - [`NatsBus`]: production implementation over an `async_nats::Client`
//! - [`InMemoryBus`]: tokio broadcast channel, for dev and tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, NatsBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production
//! let client = async_nats::connect("nats://localhost:4222").await?;
//! let bus: Arc<dyn EventBus> = Arc::new(NatsBus::new(client));
//!
//! // Dev/test
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! bus.publish("orders.events.order.created", b"{}".to_vec()).await?;
//! # Ok(())
//! # }
//! ```

mod inmemory_bus;
mod nats_bus;

pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// A message received from the bus by a subscriber.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject the message was published to.
    pub subject: String,
    /// Raw message payload.
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self { subject, payload }
    }
}

/// Errors that can occur when talking to the bus.
///
/// The dispatcher classifies these: `PublishError` and `ConnectionError`
/// are transient and retried indefinitely, while `SerializationError` and
/// `InvalidSubject` mean the broker will never accept the message as-is
/// and count toward the dead-letter bound.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject: {0}")]
    InvalidSubject(String),
}

impl BusError {
    /// True when retrying the same bytes can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BusError::SerializationError(_) | BusError::InvalidSubject(_)
        )
    }
}

pub type BusResult<T> = Result<T, BusError>;

/// Publish-subscribe messaging abstraction.
///
/// `publish` must only return `Ok` once the broker client has accepted the
/// message; the outbox dispatcher treats `Ok` as confirmation and marks the
/// entry delivered.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload to a subject, e.g. `orders.events.order.created`.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to messages matching a subject pattern.
    ///
    /// Patterns support NATS-style wildcards: `*` matches a single token,
    /// `>` matches one or more trailing tokens.
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
