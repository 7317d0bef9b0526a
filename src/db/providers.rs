//! Provider rows: prosumer sellers, mutated by the verifier after each
//! settled order (spec §3 Provider, §4.8 step 7).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProviderRow {
    pub id: i64,
    pub name: String,
    pub trust_score: f64,
    pub total_orders: i64,
    pub successful_orders: i64,
}

pub async fn create(pool: &PgPool, name: &str, initial_trust: f64) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO providers_tb (name, trust_score) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(initial_trust)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get(pool: &PgPool, provider_id: i64) -> Result<Option<ProviderRow>> {
    let row = sqlx::query_as::<_, ProviderRow>(
        "SELECT id, name, trust_score, total_orders, successful_orders FROM providers_tb WHERE id = $1",
    )
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Update trust score and bump order counters after a settled delivery
/// (spec §4.8 step 7: `total_orders++`, `successful_orders++` if FULL).
/// Takes the same transaction as the rest of `process_feedback`'s steps
/// 1-9 — this must commit or roll back atomically with them.
pub async fn record_settlement(
    tx: &mut Transaction<'_, Postgres>,
    provider_id: i64,
    new_trust_score: f64,
    was_full_delivery: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE providers_tb
        SET trust_score = $1,
            total_orders = total_orders + 1,
            successful_orders = successful_orders + CASE WHEN $2 THEN 1 ELSE 0 END
        WHERE id = $3
        "#,
    )
    .bind(new_trust_score)
    .bind(was_full_delivery)
    .bind(provider_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
