//! Outbox dispatcher
//!
//! Background loop that drains the outbox and publishes order-created
//! events to the broker. Broker unavailability is retried indefinitely with
//! capped exponential backoff; only a payload the broker permanently
//! rejects is dead-lettered, and only after a bounded number of attempts.

use std::sync::Arc;

use chrono::Utc;
use event_bus::{BusError, EventBus};
use sqlx::SqlitePool;
use tokio::time::timeout;

use crate::config::DispatchConfig;
use crate::outbox;

/// Subject the order-created event is published under.
pub const ORDER_CREATED_SUBJECT: &str = "orders.events.order.created";

// Run the retention sweep about once a minute at the default poll interval.
const SWEEP_EVERY_CYCLES: u64 = 60;

#[derive(Debug, Default)]
pub struct CycleStats {
    pub leased: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Run the dispatcher until the process shuts down. Do not await this from
/// a request path; spawn it at startup.
pub async fn run_dispatcher(pool: SqlitePool, bus: Arc<dyn EventBus>, config: DispatchConfig) {
    tracing::info!("Starting outbox dispatcher");

    let mut ticker = tokio::time::interval(config.poll_interval);
    let mut cycles: u64 = 0;

    loop {
        ticker.tick().await;
        cycles += 1;

        match run_dispatch_cycle(&pool, &bus, &config).await {
            Ok(stats) if stats.leased > 0 => {
                tracing::debug!(
                    leased = stats.leased,
                    delivered = stats.delivered,
                    failed = stats.failed,
                    dead_lettered = stats.dead_lettered,
                    "Dispatch cycle complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Dispatch cycle failed");
            }
        }

        if cycles % SWEEP_EVERY_CYCLES == 0 {
            if let Some(horizon) = config.retention {
                match outbox::purge_delivered_before(&pool, Utc::now() - horizon).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(purged = n, "Retention sweep purged delivered entries"),
                    Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
                }
            }
        }
    }
}

/// One lease-publish-ack pass over the outbox.
///
/// Leases a batch of dispatchable entries, publishes each under a
/// per-attempt timeout, and updates the outbox accordingly. A failed entry
/// becomes eligible again once its lease and backoff gate expire; the rest
/// of the batch is unaffected.
pub async fn run_dispatch_cycle(
    pool: &SqlitePool,
    bus: &Arc<dyn EventBus>,
    config: &DispatchConfig,
) -> Result<CycleStats, sqlx::Error> {
    let entries = outbox::lease_pending(pool, config.batch_size, config.lease_duration).await?;

    let mut stats = CycleStats {
        leased: entries.len(),
        ..CycleStats::default()
    };

    for entry in entries {
        let publish = bus.publish(ORDER_CREATED_SUBJECT, entry.payload.clone().into_bytes());

        let failure: PublishFailure = match timeout(config.publish_timeout, publish).await {
            Ok(Ok(())) => {
                outbox::mark_delivered(pool, &entry.order_id).await?;
                stats.delivered += 1;
                tracing::info!(
                    order_id = %entry.order_id,
                    subject = ORDER_CREATED_SUBJECT,
                    "Order-created event published"
                );
                continue;
            }
            Ok(Err(e)) if e.is_permanent() => PublishFailure::Permanent(e),
            Ok(Err(e)) => PublishFailure::Transient(e.to_string()),
            Err(_) => PublishFailure::Transient(format!(
                "publish timed out after {:?}",
                config.publish_timeout
            )),
        };

        let attempts = outbox::record_attempt_failure(pool, &entry.order_id, config).await?;

        match failure {
            PublishFailure::Permanent(e) if attempts >= config.max_publish_attempts => {
                // record_attempt_failure already bumped the counter.
                let entry = outbox::OutboxEntry { attempts, ..entry };
                outbox::mark_dead_lettered(pool, &entry, ORDER_CREATED_SUBJECT, &e.to_string())
                    .await?;
                stats.dead_lettered += 1;
            }
            PublishFailure::Permanent(e) => {
                stats.failed += 1;
                tracing::warn!(
                    order_id = %entry.order_id,
                    attempts = attempts,
                    max_attempts = config.max_publish_attempts,
                    error = %e,
                    "Broker rejected payload; will dead-letter after bounded attempts"
                );
            }
            PublishFailure::Transient(e) => {
                stats.failed += 1;
                tracing::warn!(
                    order_id = %entry.order_id,
                    attempts = attempts,
                    error = %e,
                    "Publish failed, entry stays pending for retry"
                );
            }
        }
    }

    Ok(stats)
}

enum PublishFailure {
    /// Broker unreachable or slow; retried indefinitely.
    Transient(String),
    /// Broker will never accept this payload; bounded retries then DLQ.
    Permanent(BusError),
}
