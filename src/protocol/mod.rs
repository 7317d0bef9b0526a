//! Trade protocol coordinator (spec §4.5) — discover/select/init/confirm/
//! status handlers for both buyer (BAP) and seller (BPP) sides, deduped by
//! `(message_id, direction)` before any side effect and logged to the
//! append-only event table.
//!
//! Grounded in the teacher's `TransferCoordinator`: a thin struct holding
//! `Arc`-wrapped collaborators, one method per protocol step, persist-then-
//! act ordering so a crash mid-handler leaves a replayable trail instead of
//! a half-applied one.

pub mod buyer;
pub mod envelope;
pub mod seller;
pub mod txn_cache;

use crate::clock::Clock;
use crate::db::events::{self, Direction};
use crate::escrow::orchestrator::EscrowOrchestrator;
use crate::error::{Error, Result};
use crate::idempotency::{CachedResponse, IdempotencyCache, LookupOutcome};
use crate::inventory::InventoryEngine;
use crate::lock::LockService;
use crate::order_lifecycle::OrderLifecycle;
use envelope::Action;
use sqlx::PgPool;
use std::sync::Arc;
use txn_cache::TxnCache;

pub struct Coordinator {
    pub pool: PgPool,
    pub locks: Arc<LockService>,
    pub inventory: Arc<InventoryEngine>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub escrow: Arc<EscrowOrchestrator>,
    pub idempotency: Arc<IdempotencyCache>,
    pub txn_cache: Arc<TxnCache>,
    pub clock: Arc<dyn Clock>,
    pub bap_id: String,
    pub bap_uri: String,
    pub domain: String,
}

/// Outcome of dispatching one inbound protocol message.
pub enum DispatchOutcome {
    /// First sighting of this `(message_id, direction)`; `response` is the
    /// freshly computed result.
    Processed { response: serde_json::Value },
    /// A prior response for this exact `(message_id, direction)` pair was
    /// found and is replayed verbatim (spec §4.5 idempotency, P2).
    Replayed { response: serde_json::Value },
}

impl Coordinator {
    /// Dedup-then-run wrapper shared by every handler in `buyer`/`seller`:
    /// records the inbound event, checks the idempotency cache keyed by
    /// `(action, message_id)`, and on a fresh message runs `work`, storing
    /// its result before returning. A duplicate `message_id` under the
    /// same action always replays the stored response rather than
    /// re-running `work` (spec §4.5, property P2).
    pub async fn dispatch<F, Fut>(
        &self,
        action: Action,
        transaction_id: &str,
        message_id: &str,
        raw_request: &serde_json::Value,
        work: F,
    ) -> Result<DispatchOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value>>,
    {
        let endpoint = action.as_str();

        match self.idempotency.begin(endpoint, message_id).await {
            LookupOutcome::Replay(cached) => {
                tracing::info!(transaction_id, message_id, action = endpoint, "replaying cached response");
                return Ok(DispatchOutcome::Replayed { response: cached.body });
            }
            LookupOutcome::InProgress => {
                return Err(Error::Conflict(format!(
                    "message {message_id} for action {endpoint} is already being processed"
                )));
            }
            LookupOutcome::Fresh => {}
        }

        events::record(&self.pool, transaction_id, message_id, endpoint, Direction::Inbound, raw_request).await?;

        let result = work().await;

        match result {
            Ok(response) => {
                self.idempotency
                    .store(
                        endpoint,
                        message_id,
                        CachedResponse {
                            status: "ok".to_string(),
                            body: response.clone(),
                        },
                    )
                    .await;
                events::record(&self.pool, transaction_id, message_id, &format!("on_{endpoint}"), Direction::Outbound, &response)
                    .await?;
                Ok(DispatchOutcome::Processed { response })
            }
            Err(e) => {
                self.idempotency.release(endpoint, message_id).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end in tests/protocol_flow.rs against a reachable
    // Postgres; `dispatch`'s dedup/replay logic itself is covered there
    // alongside buyer/seller handler behavior.
}
