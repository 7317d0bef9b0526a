//! User rows: buyer/seller accounts, balance and trust fields (spec §3
//! User). Balance mutations here are meant to run under `lock:payment:<id>`
//! (spec §5) — this module only issues the SQL, callers own the lock.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub trust_score: f64,
    pub allowed_trade_limit: f64,
    pub baseline_trust: f64,
    pub balance: Decimal,
    pub installed_capacity: f64,
    pub sanctioned_load: f64,
    pub provider_id: Option<i64>,
}

pub async fn create(pool: &PgPool, balance: Decimal, provider_id: Option<i64>) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users_tb (balance, provider_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(balance)
    .bind(provider_id)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get(pool: &PgPool, user_id: i64) -> Result<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, trust_score, allowed_trade_limit, baseline_trust, balance,
                  installed_capacity, sanctioned_load, provider_id
           FROM users_tb WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The user row that represents a given provider's account, used wherever
/// code holds a `providers_tb.id` (e.g. an order's seller) and needs the
/// balance/trust row to credit or update. A provider with no linked user
/// row (seeded catalog data, a provider that never registered as a user)
/// yields `Ok(None)` rather than an error — callers decide whether that's
/// fatal.
pub async fn get_by_provider_id(pool: &PgPool, provider_id: i64) -> Result<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, trust_score, allowed_trade_limit, baseline_trust, balance,
                  installed_capacity, sanctioned_load, provider_id
           FROM users_tb WHERE provider_id = $1
           ORDER BY id LIMIT 1"#,
    )
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Debit `amount`; fails with `InsufficientBalance` rather than let the
/// row go negative (spec invariant I3). Caller must hold `lock:payment:<id>`.
pub async fn debit(pool: &PgPool, user_id: i64, amount: Decimal) -> Result<()> {
    let result = sqlx::query(
        "UPDATE users_tb SET balance = balance - $1 WHERE id = $2 AND balance >= $1",
    )
    .bind(amount)
    .bind(user_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::InsufficientBalance);
    }
    Ok(())
}

pub async fn credit(pool: &PgPool, user_id: i64, amount: Decimal) -> Result<()> {
    sqlx::query("UPDATE users_tb SET balance = balance + $1 WHERE id = $2")
        .bind(amount)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Update trust and the derived allowed-trade limit after a verified
/// delivery (spec §4.10 / §4.8 step 4).
pub async fn update_trust(pool: &PgPool, user_id: i64, new_score: f64, new_limit: f64) -> Result<()> {
    sqlx::query("UPDATE users_tb SET trust_score = $1, allowed_trade_limit = $2 WHERE id = $3")
        .bind(new_score)
        .bind(new_limit)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // Exercised by tests/escrow_flow.rs against a real database; no
    // connection is available in unit scope here.
}
