//! Block rows: unit-sized slices of an offer's capacity (spec §3 Block,
//! §4.3 Inventory Engine). `claim_available` is the heart of the reservation
//! path: `SELECT ... FOR UPDATE SKIP LOCKED` so concurrent claimants never
//! block each other on rows they won't end up winning, stable ordering by
//! `(created_at, id)` per spec §4.3's tie-break rule.

use crate::error::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Available,
    Reserved,
    Sold,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Available => "AVAILABLE",
            BlockStatus::Reserved => "RESERVED",
            BlockStatus::Sold => "SOLD",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockRow {
    pub id: i64,
    pub offer_id: i64,
    pub item_id: i64,
    pub provider_id: i64,
    pub status: String,
    pub order_id: Option<i64>,
    pub transaction_id: Option<String>,
    pub price: Decimal,
    pub version: i32,
}

/// Insert `count` AVAILABLE blocks for a freshly created offer, one row
/// per unit, all sharing `price`.
pub async fn create_for_offer(
    pool: &PgPool,
    offer_id: i64,
    item_id: i64,
    provider_id: i64,
    price: Decimal,
    count: i64,
) -> Result<()> {
    for _ in 0..count {
        sqlx::query(
            "INSERT INTO blocks_tb (offer_id, item_id, provider_id, status, price) VALUES ($1, $2, $3, 'AVAILABLE', $4)",
        )
        .bind(offer_id)
        .bind(item_id)
        .bind(provider_id)
        .bind(price)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Select up to `quantity` AVAILABLE blocks of `offer_id`, locking the rows
/// `FOR UPDATE SKIP LOCKED` so concurrent claimants pick disjoint sets, then
/// transition them to RESERVED and stamp ownership. Must run inside a
/// transaction the caller already holds `lock:offer:<offer_id>` for. Returns
/// the ids actually reserved — may be fewer than `quantity` (spec §4.3's
/// partial-claim legality).
pub async fn claim_available(
    tx: &mut Transaction<'_, Postgres>,
    offer_id: i64,
    quantity: i64,
    order_id: i64,
    transaction_id: &str,
) -> Result<Vec<i64>> {
    if quantity <= 0 {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM blocks_tb
        WHERE offer_id = $1 AND status = 'AVAILABLE'
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(offer_id)
    .bind(quantity)
    .fetch_all(&mut **tx)
    .await?;

    if ids.is_empty() {
        return Ok(ids);
    }

    sqlx::query(
        r#"
        UPDATE blocks_tb
        SET status = 'RESERVED', order_id = $1, transaction_id = $2,
            reserved_at = NOW(), version = version + 1
        WHERE id = ANY($3)
        "#,
    )
    .bind(order_id)
    .bind(transaction_id)
    .bind(&ids)
    .execute(&mut **tx)
    .await?;

    Ok(ids)
}

/// Release all RESERVED blocks belonging to `transaction_id` back to
/// AVAILABLE, clearing ownership (spec §4.3 `release_blocks`).
pub async fn release_by_transaction(pool: &PgPool, transaction_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE blocks_tb
        SET status = 'AVAILABLE', order_id = NULL, transaction_id = NULL,
            reserved_at = NULL, version = version + 1
        WHERE transaction_id = $1 AND status = 'RESERVED'
        "#,
    )
    .bind(transaction_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Transition all RESERVED blocks of `order_id` to SOLD (spec §4.3
/// `mark_sold`). Must run under `lock:order:<order_id>`.
pub async fn mark_sold(pool: &PgPool, order_id: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE blocks_tb
        SET status = 'SOLD', sold_at = NOW(), version = version + 1
        WHERE order_id = $1 AND status = 'RESERVED'
        "#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Optimistic-versioned single-block status update. A version mismatch
/// returns `Ok(false)`, not an error — callers (spec §4.3) re-read and
/// retry or abort on that signal.
pub async fn update_status_if_version(
    pool: &PgPool,
    block_id: i64,
    expected_version: i32,
    new_status: BlockStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE blocks_tb SET status = $1, version = version + 1 WHERE id = $2 AND version = $3",
    )
    .bind(new_status.as_str())
    .bind(block_id)
    .bind(expected_version)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_by_status(pool: &PgPool, offer_id: i64) -> Result<(i64, i64, i64)> {
    let row: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'AVAILABLE'),
            COUNT(*) FILTER (WHERE status = 'RESERVED'),
            COUNT(*) FILTER (WHERE status = 'SOLD')
        FROM blocks_tb WHERE offer_id = $1
        "#,
    )
    .bind(offer_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get(pool: &PgPool, block_id: i64) -> Result<Option<BlockRow>> {
    let row = sqlx::query_as::<_, BlockRow>(
        "SELECT id, offer_id, item_id, provider_id, status, order_id, transaction_id, price, version FROM blocks_tb WHERE id = $1",
    )
    .bind(block_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
