//! Item rows: a seller's publishable production capacity (spec §3 Item).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Solar,
    Wind,
    Hydro,
    Biomass,
    Grid,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Solar => "SOLAR",
            SourceType::Wind => "WIND",
            SourceType::Hydro => "HYDRO",
            SourceType::Biomass => "BIOMASS",
            SourceType::Grid => "GRID",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub provider_id: i64,
    pub source_type: String,
    pub delivery_mode: String,
    pub available_qty: i64,
    pub production_windows: serde_json::Value,
}

pub async fn create(
    pool: &PgPool,
    provider_id: i64,
    source_type: SourceType,
    delivery_mode: &str,
    available_qty: i64,
    production_windows: serde_json::Value,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO items_tb (provider_id, source_type, delivery_mode, available_qty, production_windows)
           VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
    )
    .bind(provider_id)
    .bind(source_type.as_str())
    .bind(delivery_mode)
    .bind(available_qty)
    .bind(production_windows)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get(pool: &PgPool, item_id: i64) -> Result<Option<ItemRow>> {
    let row = sqlx::query_as::<_, ItemRow>(
        "SELECT id, provider_id, source_type, delivery_mode, available_qty, production_windows FROM items_tb WHERE id = $1",
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Decrement `available_qty` by `sold` when blocks sell; floors at 0.
pub async fn decrement_available(pool: &PgPool, item_id: i64, sold: i64) -> Result<()> {
    sqlx::query("UPDATE items_tb SET available_qty = GREATEST(0, available_qty - $1) WHERE id = $2")
        .bind(sold)
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(())
}
