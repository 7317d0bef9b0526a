//! Event log: append-only, `(message_id, direction)` is the dedup key
//! (spec §3 Event, invariant I7). `record` is an `ON CONFLICT DO NOTHING`
//! upsert so a duplicate delivery of the same message is a no-op, not an
//! error — the coordinator decides separately whether to replay a cached
//! response.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }
}

/// Returns `true` if this call inserted a new row (first sighting of this
/// `(message_id, direction)` pair), `false` if it already existed.
pub async fn record(
    pool: &PgPool,
    transaction_id: &str,
    message_id: &str,
    action: &str,
    direction: Direction,
    raw_json: &serde_json::Value,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO events_tb (transaction_id, message_id, action, direction, raw_json)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (message_id, direction) DO NOTHING
        "#,
    )
    .bind(transaction_id)
    .bind(message_id)
    .bind(action)
    .bind(direction.as_str())
    .bind(raw_json)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seen(pool: &PgPool, message_id: &str, direction: Direction) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM events_tb WHERE message_id = $1 AND direction = $2)",
    )
    .bind(message_id)
    .bind(direction.as_str())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
