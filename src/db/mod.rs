//! Relational store (spec §3, §4.3, §4.4, §4.7).
//!
//! One `Database` pool wrapper plus one submodule per table family. Hand
//! written SQL via `sqlx::query`/`query_as`, no ORM — the teacher's
//! `db::Database` / `internal_transfer::db::TransferDb` shape generalized
//! to this domain's tables. `schema.rs` brings up the schema idempotently
//! at startup so the same binary can run against an empty database.

pub mod agents;
pub mod blocks;
pub mod escrow;
pub mod events;
pub mod feedback;
pub mod items;
pub mod offers;
pub mod orders;
pub mod payments;
pub mod providers;
pub mod schema;
pub mod transfers;
pub mod trust_history;
pub mod users;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Bring the schema up to date: create missing tables, add missing
    /// columns. Safe to call on every startup against an existing database.
    pub async fn run_schema_check(&self) -> Result<(), sqlx::Error> {
        schema::ensure_schema(&self.pool).await
    }
}
