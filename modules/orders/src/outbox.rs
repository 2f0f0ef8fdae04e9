//! Transactional outbox for order-created events
//!
//! An entry is enqueued in the same transaction as its order row, so an
//! order without an event (or an event without an order) is never
//! observable. The dispatcher drains entries with advisory, timestamp-based
//! leases: a crashed dispatcher's lease simply expires and the entry
//! becomes eligible again. That makes delivery at-least-once; consumers
//! must be idempotent on `orderId`.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::DispatchConfig;
use crate::models::OrderCreatedPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Not yet confirmed by the broker; eligible for dispatch.
    Pending,
    /// Broker confirmed receipt. Terminal.
    Delivered,
    /// Permanently rejected after bounded attempts; needs an operator.
    DeadLettered,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: i64,
    pub order_id: String,
    /// Serialized event body, published to the broker verbatim.
    pub payload: String,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub leased_until: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Enqueue an order-created event within the given transaction.
///
/// Must run in the same transaction as the order insert; if either write
/// fails the whole unit rolls back.
pub async fn enqueue(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
    payload: &OrderCreatedPayload,
) -> Result<i64, sqlx::Error> {
    let payload = serde_json::to_string(payload).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO events_outbox (order_id, payload, status, attempts, created_at)
        VALUES ($1, $2, 'pending', 0, $3)
        RETURNING id
        "#,
    )
    .bind(order_id)
    .bind(&payload)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await?;

    tracing::debug!(order_id = %order_id, outbox_id = id, "Event enqueued to outbox");

    Ok(id)
}

/// Atomically claim up to `limit` dispatchable entries.
///
/// An entry is dispatchable when it is `pending`, any previous lease has
/// expired, and its backoff gate (`next_attempt_at`) has passed. Claimed
/// entries are stamped with a fresh lease in the same statement, so two
/// dispatchers polling concurrently never receive the same entry within one
/// lease window. Returned entries are ordered oldest-attempt-first (never
/// attempted first) for fairness.
pub async fn lease_pending(
    pool: &SqlitePool,
    limit: i64,
    lease_duration: chrono::Duration,
) -> Result<Vec<OutboxEntry>, sqlx::Error> {
    let now = Utc::now();
    let leased_until = now + lease_duration;

    let mut entries = sqlx::query_as::<_, OutboxEntry>(
        r#"
        UPDATE events_outbox
        SET leased_until = $1
        WHERE id IN (
            SELECT id FROM events_outbox
            WHERE status = 'pending'
              AND (leased_until IS NULL OR leased_until < $2)
              AND (next_attempt_at IS NULL OR next_attempt_at <= $2)
            ORDER BY last_attempt_at ASC NULLS FIRST, id ASC
            LIMIT $3
        )
        RETURNING id, order_id, payload, status, attempts,
                  last_attempt_at, leased_until, next_attempt_at,
                  created_at, delivered_at
        "#,
    )
    .bind(leased_until)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    // RETURNING does not guarantee the subquery's ordering.
    entries.sort_by(|a, b| {
        a.last_attempt_at
            .cmp(&b.last_attempt_at)
            .then(a.id.cmp(&b.id))
    });

    Ok(entries)
}

/// Mark an entry delivered after the broker confirmed receipt.
///
/// Idempotent: marking an already-delivered entry is a no-op. A lease can
/// expire while a publish is in flight, so this may race with a second
/// delivery of the same entry. That is the at-least-once contract.
pub async fn mark_delivered(pool: &SqlitePool, order_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE events_outbox
        SET status = 'delivered', delivered_at = $1
        WHERE order_id = $2 AND status = 'pending'
        "#,
    )
    .bind(Utc::now())
    .bind(order_id)
    .execute(pool)
    .await?;

    tracing::debug!(order_id = %order_id, "Outbox entry marked delivered");

    Ok(())
}

/// Record a failed publish attempt: bump the attempt counter, stamp
/// `last_attempt_at`, and push `next_attempt_at` out by a capped
/// exponential backoff keyed off the attempt count. Status stays `pending`.
///
/// Both writes run in one transaction, so a crash mid-call never leaves a
/// bumped counter with a stale backoff gate. A failure report can race a
/// concurrent delivery of the same entry (an expired lease makes that
/// possible); only `pending` rows are touched, so a delivered entry is
/// left alone.
///
/// Returns the new attempt count, or 0 when the entry was no longer
/// pending.
pub async fn record_attempt_failure(
    pool: &SqlitePool,
    order_id: &str,
    config: &DispatchConfig,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let attempts: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE events_outbox
        SET attempts = attempts + 1, last_attempt_at = $1
        WHERE order_id = $2 AND status = 'pending'
        RETURNING attempts
        "#,
    )
    .bind(now)
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(attempts) = attempts else {
        tracing::debug!(
            order_id = %order_id,
            "Failure report ignored, entry no longer pending"
        );
        return Ok(0);
    };

    let next_attempt_at = now + backoff_delay(attempts, config);
    sqlx::query(
        r#"
        UPDATE events_outbox
        SET next_attempt_at = $1
        WHERE order_id = $2
        "#,
    )
    .bind(next_attempt_at)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(attempts)
}

/// Move an entry the broker permanently rejects to the dead-letter state
/// and record it in `failed_events` for operator attention. Nothing is
/// silently dropped, and other entries are unaffected.
///
/// Only `pending` entries are eligible; an entry delivered concurrently by
/// another dispatcher stays delivered and no DLQ row is written.
pub async fn mark_dead_lettered(
    pool: &SqlitePool,
    entry: &OutboxEntry,
    subject: &str,
    error: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE events_outbox
        SET status = 'dead_lettered'
        WHERE order_id = $1 AND status = 'pending'
        "#,
    )
    .bind(&entry.order_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tracing::debug!(
            order_id = %entry.order_id,
            "Dead-letter skipped, entry no longer pending"
        );
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO failed_events (order_id, subject, payload, error, retry_count, failed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (order_id) DO UPDATE
        SET retry_count = excluded.retry_count,
            error = excluded.error,
            failed_at = excluded.failed_at
        "#,
    )
    .bind(&entry.order_id)
    .bind(subject)
    .bind(&entry.payload)
    .bind(error)
    .bind(entry.attempts)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::error!(
        order_id = %entry.order_id,
        subject = %subject,
        attempts = entry.attempts,
        error = %error,
        "Outbox entry moved to DLQ"
    );

    Ok(())
}

/// Retention sweep: purge delivered entries older than the configured
/// horizon. Pending and dead-lettered entries are never touched.
pub async fn purge_delivered_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM events_outbox
        WHERE status = 'delivered' AND delivered_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Capped exponential backoff: `initial * 2^(attempts-1)`, at most
/// `max_backoff`.
fn backoff_delay(attempts: i64, config: &DispatchConfig) -> chrono::Duration {
    // Cap the exponent; beyond this the cap dominates anyway.
    let exp = (attempts - 1).clamp(0, 20) as u32;
    let delay = config.initial_backoff * 2i32.pow(exp);
    std::cmp::min(delay, config.max_backoff)
}
