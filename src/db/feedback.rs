//! Delivery feedback rows: one per verified order, append-only (spec §3
//! Delivery Feedback, §4.8 step 1).

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Full,
    Partial,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Full => "FULL",
            DeliveryStatus::Partial => "PARTIAL",
            DeliveryStatus::Failed => "FAILED",
        }
    }

    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.0 {
            DeliveryStatus::Full
        } else if ratio > 0.0 {
            DeliveryStatus::Partial
        } else {
            DeliveryStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedbackRow {
    pub order_id: i64,
    pub seller_id: i64,
    pub delivered_qty: Decimal,
    pub expected_qty: Decimal,
    pub ratio: f64,
    pub status: String,
    pub trust_impact: f64,
    pub verified_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
    seller_id: i64,
    delivered_qty: Decimal,
    expected_qty: Decimal,
    ratio: f64,
    status: DeliveryStatus,
    trust_impact: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feedback_tb (order_id, seller_id, delivered_qty, expected_qty, ratio, status, trust_impact)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(order_id)
    .bind(seller_id)
    .bind(delivered_qty)
    .bind(expected_qty)
    .bind(ratio)
    .bind(status.as_str())
    .bind(trust_impact)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
