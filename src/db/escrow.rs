//! Escrow rows: one per trade, `trade_id` is the primary key so the
//! "idempotent-insert keyed by trade_id" step in spec §4.7 is a plain
//! `ON CONFLICT DO NOTHING`. Grounded in `transfer::coordinator`'s
//! persist-before-call shape: the row is written before the bank call
//! commits to BLOCKED, never after.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    Initiated,
    Blocked,
    Released,
    Refunded,
    Expired,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Initiated => "INITIATED",
            EscrowStatus::Blocked => "BLOCKED",
            EscrowStatus::Released => "RELEASED",
            EscrowStatus::Refunded => "REFUNDED",
            EscrowStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INITIATED" => Some(Self::Initiated),
            "BLOCKED" => Some(Self::Blocked),
            "RELEASED" => Some(Self::Released),
            "REFUNDED" => Some(Self::Refunded),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EscrowRow {
    pub trade_id: i64,
    pub buyer_id: i64,
    pub seller_id: Option<i64>,
    pub principal: Decimal,
    pub fee: Decimal,
    pub total_blocked: Decimal,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub funded_receipt_id: Option<String>,
    pub payout_receipt_id: Option<String>,
}

/// Idempotent insert: if a row for `trade_id` already exists, this is a
/// no-op and the existing row is returned. `inserted` tells the caller
/// which outcome occurred (spec §4.7's "every insert surfaces an
/// inserted|noop outcome").
pub async fn insert_if_absent(
    pool: &PgPool,
    trade_id: i64,
    buyer_id: i64,
    seller_id: Option<i64>,
    principal: Decimal,
    fee: Decimal,
    total_blocked: Decimal,
    expires_at: DateTime<Utc>,
    funded_receipt_id: &str,
) -> Result<(EscrowRow, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO escrow_tb (trade_id, buyer_id, seller_id, principal, fee, total_blocked, status, expires_at, funded_receipt_id)
        VALUES ($1, $2, $3, $4, $5, $6, 'BLOCKED', $7, $8)
        ON CONFLICT (trade_id) DO NOTHING
        "#,
    )
    .bind(trade_id)
    .bind(buyer_id)
    .bind(seller_id)
    .bind(principal)
    .bind(fee)
    .bind(total_blocked)
    .bind(expires_at)
    .bind(funded_receipt_id)
    .execute(pool)
    .await?;

    let inserted = result.rows_affected() > 0;
    let row = get(pool, trade_id)
        .await?
        .ok_or_else(|| crate::error::Error::Internal("escrow row vanished after insert".to_string()))?;
    Ok((row, inserted))
}

pub async fn get(pool: &PgPool, trade_id: i64) -> Result<Option<EscrowRow>> {
    let row = sqlx::query_as::<_, EscrowRow>(
        r#"SELECT trade_id, buyer_id, seller_id, principal, fee, total_blocked, status,
                  expires_at, funded_receipt_id, payout_receipt_id
           FROM escrow_tb WHERE trade_id = $1"#,
    )
    .bind(trade_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn set_status(pool: &PgPool, trade_id: i64, status: EscrowStatus) -> Result<()> {
    sqlx::query("UPDATE escrow_tb SET status = $1, updated_at = NOW() WHERE trade_id = $2")
        .bind(status.as_str())
        .bind(trade_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_payout_receipt(pool: &PgPool, trade_id: i64, receipt_id: &str) -> Result<()> {
    sqlx::query("UPDATE escrow_tb SET payout_receipt_id = $1, updated_at = NOW() WHERE trade_id = $2")
        .bind(receipt_id)
        .bind(trade_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Sweep BLOCKED rows whose lease has lapsed into EXPIRED (spec §4.7
/// Reconciler). Returns the trade ids transitioned.
pub async fn expire_lapsed(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        UPDATE escrow_tb
        SET status = 'EXPIRED', updated_at = NOW()
        WHERE status = 'BLOCKED' AND expires_at < $1
        RETURNING trade_id
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
