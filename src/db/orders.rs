//! Order rows: the DAG-checked state machine over a trade (spec §3 Order,
//! §4.4 Order Lifecycle). Status transitions use optimistic `version` CAS
//! under `lock:order:<id>` (caller's responsibility to hold the lock) —
//! generalized from `internal_transfer/db.rs`'s `update_state_if`.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Draft,
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Active => "ACTIVE",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Escrowed,
    Released,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Escrowed => "ESCROWED",
            PaymentStatus::Released => "RELEASED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub transaction_id: String,
    pub provider_id: Option<i64>,
    pub selected_offer_id: Option<i64>,
    pub buyer_id: Option<i64>,
    pub status: String,
    pub total_qty: i64,
    pub total_price: Decimal,
    pub currency: String,
    pub items_snapshot: serde_json::Value,
    pub quote_snapshot: serde_json::Value,
    pub version: i32,
    pub payment_status: String,
    pub escrowed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub discom_verified: bool,
}

const ORDER_COLUMNS: &str = r#"id, transaction_id, provider_id, selected_offer_id, buyer_id, status,
       total_qty, total_price, currency, items_snapshot, quote_snapshot, version,
       payment_status, escrowed_at, released_at, discom_verified"#;

/// Insert a DRAFT order bound to `transaction_id` inside an in-flight
/// transaction, as the first step of `claim_blocks` (spec §4.3 step 1).
pub async fn create_draft(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
    provider_id: Option<i64>,
    selected_offer_id: Option<i64>,
    buyer_id: Option<i64>,
    total_qty: i64,
    total_price: Decimal,
    currency: &str,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO orders_tb (transaction_id, provider_id, selected_offer_id, buyer_id, status, total_qty, total_price, currency)
        VALUES ($1, $2, $3, $4, 'DRAFT', $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(transaction_id)
    .bind(provider_id)
    .bind(selected_offer_id)
    .bind(buyer_id)
    .bind(total_qty)
    .bind(total_price)
    .bind(currency)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// Reprice a DRAFT order down to what was actually reserved, for the
/// over-quantity claim case (spec §4.3 "over-quantity claims return
/// whatever is available" — the order must reflect the shortfall, not the
/// original ask).
pub async fn update_claimed_quantity(tx: &mut Transaction<'_, Postgres>, order_id: i64, actual_qty: i64, actual_price: Decimal) -> Result<()> {
    sqlx::query("UPDATE orders_tb SET total_qty = $1, total_price = $2 WHERE id = $3")
        .bind(actual_qty)
        .bind(actual_price)
        .bind(order_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, order_id: i64) -> Result<Option<OrderRow>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders_tb WHERE id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_by_transaction(pool: &PgPool, transaction_id: &str) -> Result<Option<OrderRow>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders_tb WHERE transaction_id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// CAS status + version transition, the DAG-checked move named in spec
/// §4.4. Returns `Ok(false)` on a version mismatch rather than erroring —
/// the order lifecycle module decides whether that's a retry or an abort.
pub async fn transition_if_version(
    pool: &PgPool,
    order_id: i64,
    expected_version: i32,
    new_status: OrderStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE orders_tb SET status = $1, version = version + 1, updated_at = NOW() WHERE id = $2 AND version = $3",
    )
    .bind(new_status.as_str())
    .bind(order_id)
    .bind(expected_version)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_escrowed(pool: &PgPool, order_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE orders_tb SET payment_status = 'ESCROWED', escrowed_at = NOW(), updated_at = NOW() WHERE id = $1",
    )
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Final settlement stamp: spec §4.8 step 6 (COMPLETED, RELEASED,
/// `released_at`, `discom_verified=true`) performed inside the caller's
/// delivery-feedback transaction.
pub async fn mark_completed_released(tx: &mut Transaction<'_, Postgres>, order_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders_tb
        SET status = 'COMPLETED', payment_status = 'RELEASED', released_at = NOW(),
            discom_verified = TRUE, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn cancel(
    pool: &PgPool,
    order_id: i64,
    cancelled_by: &str,
    reason: &str,
    penalty: Option<Decimal>,
    refund: Option<Decimal>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders_tb
        SET status = 'CANCELLED', cancel_at = NOW(), cancel_by = $1, cancel_reason = $2,
            cancel_penalty = $3, cancel_refund = $4, version = version + 1, updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(cancelled_by)
    .bind(reason)
    .bind(penalty)
    .bind(refund)
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Orders stuck in DRAFT with a non-null escrow marker: crash recovery
/// window between the escrow call and the status write (spec §4.4
/// "Recovery"). Promoting them to ACTIVE is the order-lifecycle module's job;
/// this just finds the candidates.
pub async fn find_stuck_draft_with_escrow(pool: &PgPool) -> Result<Vec<OrderRow>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        r#"SELECT {ORDER_COLUMNS} FROM orders_tb
           WHERE status = 'DRAFT' AND escrowed_at IS NOT NULL"#
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Orders past their delivery window awaiting verification (spec §4.8
/// step 2): joins the selected offer's window when present.
pub async fn find_awaiting_verification(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<OrderRow>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        SELECT {cols} FROM orders_tb o
        WHERE o.status = 'ACTIVE' AND o.discom_verified = FALSE AND o.provider_id IS NOT NULL
          AND EXISTS (
              SELECT 1 FROM offers_tb f WHERE f.id = o.selected_offer_id AND f.window_end < $1
          )
        "#,
        cols = ORDER_COLUMNS
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Externally-hosted active orders (no local provider) past their window,
/// settled without a verifier call (spec §4.8: "mark COMPLETED with
/// payment_status=RELEASED (externally settled)").
pub async fn find_externally_hosted_past_window(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<OrderRow>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        SELECT {cols} FROM orders_tb o
        WHERE o.status = 'ACTIVE' AND o.provider_id IS NULL
          AND (o.quote_snapshot->>'window_end') IS NOT NULL
          AND (o.quote_snapshot->>'window_end')::timestamptz < $1
        "#,
        cols = ORDER_COLUMNS
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_completed_externally_settled(pool: &PgPool, order_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE orders_tb
        SET status = 'COMPLETED', payment_status = 'RELEASED', released_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(())
}
