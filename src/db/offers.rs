//! Offer rows: one priced, windowed catalog entry per item listing (spec §3
//! Offer). Deletion is the verifier's post-settlement cleanup sweep
//! (spec §4.8, "delete offer rows whose window is past and whose
//! remaining blocks are all non-AVAILABLE").

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OfferRow {
    pub id: i64,
    pub item_id: i64,
    pub provider_id: i64,
    pub price_per_unit: Decimal,
    pub currency: String,
    pub max_qty: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub pricing_model: String,
    pub settlement_type: String,
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &PgPool,
    item_id: i64,
    provider_id: i64,
    price_per_unit: Decimal,
    currency: &str,
    max_qty: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO offers_tb (item_id, provider_id, price_per_unit, currency, max_qty, window_start, window_end)
           VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id"#,
    )
    .bind(item_id)
    .bind(provider_id)
    .bind(price_per_unit)
    .bind(currency)
    .bind(max_qty)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get(pool: &PgPool, offer_id: i64) -> Result<Option<OfferRow>> {
    let row = sqlx::query_as::<_, OfferRow>(
        r#"SELECT id, item_id, provider_id, price_per_unit, currency, max_qty,
                  window_start, window_end, pricing_model, settlement_type
           FROM offers_tb WHERE id = $1"#,
    )
    .bind(offer_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Candidate offers for the matching algorithm (spec §4.6): those whose
/// window has not yet fully elapsed.
pub async fn list_active(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<OfferRow>> {
    let rows = sqlx::query_as::<_, OfferRow>(
        r#"SELECT id, item_id, provider_id, price_per_unit, currency, max_qty,
                  window_start, window_end, pricing_model, settlement_type
           FROM offers_tb WHERE window_end > $1"#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete offers past their window whose blocks are all non-AVAILABLE.
/// Returns the number of rows removed. Best-effort cleanup: failures here
/// are logged by the caller, not propagated as fatal (spec §4.8).
pub async fn delete_spent(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM offers_tb o
        WHERE o.window_end < $1
          AND NOT EXISTS (
              SELECT 1 FROM blocks_tb b WHERE b.offer_id = o.id AND b.status = 'AVAILABLE'
          )
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
