//! Payment record rows: append-only audit of money movements (spec §3
//! Payment Record, §4.8 step 9).

use crate::error::Result;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentType {
    Escrow,
    Release,
    CancelPenalty,
    Refund,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Escrow => "ESCROW",
            PaymentType::Release => "RELEASE",
            PaymentType::CancelPenalty => "CANCEL_PENALTY",
            PaymentType::Refund => "REFUND",
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
    buyer_id: Option<i64>,
    seller_id: Option<i64>,
    payment_type: PaymentType,
    total_amount: Decimal,
    buyer_refund: Option<Decimal>,
    seller_amount: Option<Decimal>,
    platform_fee: Option<Decimal>,
    to_grid_amount: Option<Decimal>,
    status: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments_tb
            (order_id, buyer_id, seller_id, type, total_amount, buyer_refund, seller_amount, platform_fee, to_grid_amount, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(order_id)
    .bind(buyer_id)
    .bind(seller_id)
    .bind(payment_type.as_str())
    .bind(total_amount)
    .bind(buyer_refund)
    .bind(seller_amount)
    .bind(platform_fee)
    .bind(to_grid_amount)
    .bind(status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
