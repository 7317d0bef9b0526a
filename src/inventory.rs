//! Inventory engine (spec §4.3) — block claim/release/sell under an
//! offer-wide exclusive lease.
//!
//! Mirrors `TransferCoordinator`'s shape: hold a lock, run the state
//! change as one DB transaction, return a typed result. Block selection
//! uses `db::blocks::claim_available`'s `SELECT ... FOR UPDATE SKIP LOCKED`
//! so concurrent claimants never deadlock on rows they won't win.

use crate::db::blocks::{self, BlockStatus};
use crate::db::offers;
use crate::db::orders;
use crate::error::{Error, Result};
use crate::lock::{self, LockService};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

pub struct InventoryEngine {
    pool: PgPool,
    locks: Arc<LockService>,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub order_id: i64,
    pub block_ids: Vec<i64>,
}

impl InventoryEngine {
    pub fn new(pool: PgPool, locks: Arc<LockService>) -> Self {
        Self { pool, locks }
    }

    /// Reserve up to `quantity` blocks of `offer_id` for `transaction_id`,
    /// drafting an order row in the same transaction (spec §4.3). Zero
    /// quantity is legal and returns an order with no blocks without
    /// touching the blocks table.
    pub async fn claim_blocks(
        &self,
        offer_id: i64,
        quantity: i64,
        transaction_id: &str,
        buyer_id: Option<i64>,
    ) -> Result<ClaimOutcome> {
        let offer = offers::get(&self.pool, offer_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("offer {offer_id}")))?;

        let resource = lock::keys::offer(&offer_id.to_string());
        self.locks
            .with_lock(&resource, || async {
                let mut tx = self.pool.begin().await.map_err(Error::from)?;

                let order_id = orders::create_draft(
                    &mut tx,
                    transaction_id,
                    Some(offer.provider_id),
                    Some(offer_id),
                    buyer_id,
                    quantity,
                    offer.price_per_unit * rust_decimal::Decimal::from(quantity.max(0)),
                    &offer.currency,
                )
                .await?;

                let block_ids = blocks::claim_available(&mut tx, offer_id, quantity, order_id, transaction_id).await?;

                if (block_ids.len() as i64) != quantity {
                    let actual_qty = block_ids.len() as i64;
                    let actual_price = offer.price_per_unit * rust_decimal::Decimal::from(actual_qty);
                    orders::update_claimed_quantity(&mut tx, order_id, actual_qty, actual_price).await?;
                }

                tx.commit().await.map_err(Error::from)?;

                info!(offer_id, order_id, claimed = block_ids.len(), requested = quantity, "blocks claimed");
                Ok(ClaimOutcome { order_id, block_ids })
            })
            .await
    }

    /// Release all RESERVED blocks of `transaction_id` back to AVAILABLE
    /// (spec §4.3 `release_blocks`) — used on handshake abandonment or
    /// explicit cancellation before confirm.
    pub async fn release_blocks(&self, offer_id: i64, transaction_id: &str) -> Result<u64> {
        let resource = lock::keys::offer(&offer_id.to_string());
        self.locks
            .with_lock(&resource, || async {
                let released = blocks::release_by_transaction(&self.pool, transaction_id).await?;
                info!(transaction_id, released, "blocks released");
                Ok(released)
            })
            .await
    }

    /// Transition all RESERVED blocks of `order_id` to SOLD (spec §4.3
    /// `mark_sold`), under `lock:order:<id>`.
    pub async fn mark_sold(&self, order_id: i64) -> Result<u64> {
        let resource = lock::keys::order(&order_id.to_string());
        self.locks
            .with_lock(&resource, || async {
                let sold = blocks::mark_sold(&self.pool, order_id).await?;
                info!(order_id, sold, "blocks marked sold");
                Ok(sold)
            })
            .await
    }

    /// Optimistic-versioned single-block transition; surfaces
    /// `OptimisticLock` on a version mismatch rather than silently
    /// dropping the write (spec §4.3).
    pub async fn update_block_status(&self, block_id: i64, expected_version: i32, new_status: BlockStatus) -> Result<()> {
        let ok = blocks::update_status_if_version(&self.pool, block_id, expected_version, new_status).await?;
        if !ok {
            return Err(Error::OptimisticLock(format!("block {block_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a real database in tests/inventory_flow.rs; the
    // lock-then-mutate shape itself is covered by lock.rs's own unit tests.
}
