//! Agent and proposal rows (spec §3 Agent, Proposal; §4.11 Agent Runtime).

use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentRow {
    pub id: i64,
    pub owner_id: i64,
    pub agent_type: String,
    pub status: String,
    pub execution_mode: String,
    pub config: serde_json::Value,
}

pub async fn create(
    pool: &PgPool,
    owner_id: i64,
    agent_type: &str,
    execution_mode: &str,
    config: &serde_json::Value,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO agents_tb (owner_id, agent_type, execution_mode, config) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(owner_id)
    .bind(agent_type)
    .bind(execution_mode)
    .bind(config)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get(pool: &PgPool, agent_id: i64) -> Result<Option<AgentRow>> {
    let row = sqlx::query_as::<_, AgentRow>(
        "SELECT id, owner_id, agent_type, status, execution_mode, config FROM agents_tb WHERE id = $1",
    )
    .bind(agent_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Agents eligible for a tick: `status = 'active'` (spec §4.11 "Periodic
/// tick per active agent").
pub async fn list_active(pool: &PgPool) -> Result<Vec<AgentRow>> {
    let rows = sqlx::query_as::<_, AgentRow>(
        "SELECT id, owner_id, agent_type, status, execution_mode, config FROM agents_tb WHERE status = 'active'",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_status(pool: &PgPool, agent_id: i64, status: &str) -> Result<()> {
    sqlx::query("UPDATE agents_tb SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(agent_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProposalRow {
    pub id: i64,
    pub agent_id: i64,
    pub action: String,
    pub offer_id: Option<i64>,
    pub qty: i64,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub reasoning: String,
    pub status: String,
    pub decided_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &PgPool,
    agent_id: i64,
    action: &str,
    offer_id: Option<i64>,
    qty: i64,
    price_per_unit: Decimal,
    total_price: Decimal,
    reasoning: &str,
    status: &str,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO proposals_tb (agent_id, action, offer_id, qty, price_per_unit, total_price, reasoning, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(agent_id)
    .bind(action)
    .bind(offer_id)
    .bind(qty)
    .bind(price_per_unit)
    .bind(total_price)
    .bind(reasoning)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_proposal(pool: &PgPool, proposal_id: i64) -> Result<Option<ProposalRow>> {
    let row = sqlx::query_as::<_, ProposalRow>(
        r#"SELECT id, agent_id, action, offer_id, qty, price_per_unit, total_price, reasoning,
                  status, decided_at, executed_at, created_at
           FROM proposals_tb WHERE id = $1"#,
    )
    .bind(proposal_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn mark_decided(pool: &PgPool, proposal_id: i64, status: &str) -> Result<()> {
    sqlx::query("UPDATE proposals_tb SET status = $1, decided_at = NOW() WHERE id = $2")
        .bind(status)
        .bind(proposal_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_executed(pool: &PgPool, proposal_id: i64) -> Result<()> {
    sqlx::query("UPDATE proposals_tb SET status = 'executed', executed_at = NOW() WHERE id = $1")
        .bind(proposal_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Proposals stuck `pending` past `ttl` (spec §4.11 "Proposals expire
/// after a configurable window").
pub async fn expire_stale_pending(pool: &PgPool, now: DateTime<Utc>, ttl_secs: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE proposals_tb
        SET status = 'expired'
        WHERE status = 'pending' AND created_at < $1
        "#,
    )
    .bind(now - chrono::Duration::seconds(ttl_secs))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
