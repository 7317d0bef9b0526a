//! Trust history rows: append-only audit trail of every trust mutation
//! (spec §3 Trust History). Written for both sellers (delivery outcome)
//! and buyers (small completion bonus, spec §4.8 step 8).

use crate::error::Result;
use sqlx::{Postgres, Transaction};

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    prev_score: f64,
    new_score: f64,
    prev_limit: f64,
    new_limit: f64,
    reason: &str,
    order_id: Option<i64>,
    metadata: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trust_history_tb (user_id, prev_score, new_score, prev_limit, new_limit, reason, order_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(user_id)
    .bind(prev_score)
    .bind(new_score)
    .bind(prev_limit)
    .bind(new_limit)
    .bind(reason)
    .bind(order_id)
    .bind(metadata)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
