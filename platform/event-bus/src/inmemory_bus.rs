//! In-memory implementation of the [`EventBus`] trait for dev and test

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Bus implementation over a tokio broadcast channel.
///
/// Suitable for unit and integration tests (no external broker) and for
/// running the service locally without Docker. Every subscriber receives
/// all messages whose subject matches its pattern.
#[derive(Clone)]
pub struct InMemoryBus {
    // One channel for all subjects; subscribers filter by pattern.
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Create a bus with room for 1000 in-flight messages. Older messages
    /// are dropped for subscribers that fall further behind than that.
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// NATS-style subject matching: `*` matches exactly one token, `>`
    /// matches one or more trailing tokens.
    fn matches_pattern(subject: &str, pattern: &str) -> bool {
        let mut subject_tokens = subject.split('.');
        let mut pattern_tokens = pattern.split('.');

        loop {
            match (subject_tokens.next(), pattern_tokens.next()) {
                // `>` needs at least one token left to consume.
                (Some(_), Some(">")) => return true,
                (Some(_), Some("*")) => {}
                (Some(s), Some(p)) if s == p => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(subject.to_string(), payload);
        // send only fails when there are no receivers, which is fine for a
        // publish-and-forget bus.
        if self.sender.send(msg).is_err() {
            tracing::trace!(subject = %subject, "No subscribers for message");
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let rx = self.sender.subscribe();
        let pattern = subject.to_string();

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => return Some((msg, rx)),
                    // Skip messages dropped due to lag; channel still open.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |msg| {
            let keep = Self::matches_pattern(&msg.subject, &pattern);
            async move { keep }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching() {
        assert!(InMemoryBus::matches_pattern(
            "orders.events.order.created",
            "orders.events.>"
        ));
        assert!(InMemoryBus::matches_pattern(
            "orders.events.order.created",
            "orders.*.order.created"
        ));
        assert!(InMemoryBus::matches_pattern(
            "orders.events.order.created",
            "orders.events.order.created"
        ));
        assert!(!InMemoryBus::matches_pattern(
            "orders.events.order.created",
            "orders.events.*"
        ));
        assert!(!InMemoryBus::matches_pattern(
            "payments.events.x",
            "orders.events.>"
        ));
        assert!(!InMemoryBus::matches_pattern("orders", "orders.>"));
        // `>` consumes one or more tokens, never zero.
        assert!(InMemoryBus::matches_pattern("orders.events", "orders.>"));
        assert!(!InMemoryBus::matches_pattern(
            "orders.events",
            "orders.events.>"
        ));
    }

    #[tokio::test]
    async fn publish_reaches_matching_subscriber() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("orders.events.>").await.unwrap();

        bus.publish("orders.events.order.created", b"hello".to_vec())
            .await
            .unwrap();

        let msg = stream.next().await.unwrap();
        assert_eq!(msg.subject, "orders.events.order.created");
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn non_matching_subjects_are_filtered_out() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("orders.events.>").await.unwrap();

        bus.publish("billing.events.invoice.created", b"no".to_vec())
            .await
            .unwrap();
        bus.publish("orders.events.order.created", b"yes".to_vec())
            .await
            .unwrap();

        let msg = stream.next().await.unwrap();
        assert_eq!(msg.payload, b"yes");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::new();
        bus.publish("orders.events.order.created", b"x".to_vec())
            .await
            .unwrap();
    }
}
