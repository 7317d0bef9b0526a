//! Transfer rows: at-most-one settlement per trade per kind, enforced by
//! the unique `(trade_id, kind)` constraint (spec §3 Transfer, invariant I4,
//! §4.7's idempotency guarantee).

use crate::error::Result;
use crate::clock::new_id;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Release,
    Refund,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Release => "RELEASE",
            TransferKind::Refund => "REFUND",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransferRow {
    pub transfer_id: String,
    pub trade_id: i64,
    pub kind: String,
    pub amount: Decimal,
    pub status: String,
}

/// Idempotent insert keyed on `(trade_id, kind)`. Returns `inserted=false`
/// when a prior transfer of this kind already exists for the trade — the
/// escrow orchestrator treats that as `ERROR_ALREADY_SETTLED`.
pub async fn insert_if_absent(
    pool: &PgPool,
    trade_id: i64,
    kind: TransferKind,
    amount: Decimal,
) -> Result<(TransferRow, bool)> {
    let transfer_id = new_id().to_string();
    let result = sqlx::query(
        r#"
        INSERT INTO transfers_tb (transfer_id, trade_id, kind, amount, status)
        VALUES ($1, $2, $3, $4, 'COMPLETED')
        ON CONFLICT (trade_id, kind) DO NOTHING
        "#,
    )
    .bind(&transfer_id)
    .bind(trade_id)
    .bind(kind.as_str())
    .bind(amount)
    .execute(pool)
    .await?;

    let inserted = result.rows_affected() > 0;
    let row = sqlx::query_as::<_, TransferRow>(
        "SELECT transfer_id, trade_id, kind, amount, status FROM transfers_tb WHERE trade_id = $1 AND kind = $2",
    )
    .bind(trade_id)
    .bind(kind.as_str())
    .fetch_one(pool)
    .await?;
    Ok((row, inserted))
}

pub async fn any_settlement_for_trade(pool: &PgPool, trade_id: i64) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM transfers_tb WHERE trade_id = $1)")
            .bind(trade_id)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}
