//! Application state: the capability bundle every entrypoint (the CLI
//! binary, the background loops, tests) is built from.
//!
//! Grounded in the teacher's `gateway::state::AppState`: one `Clone`-able
//! struct holding `Arc`-wrapped collaborators, assembled once at startup by
//! `AppState::bootstrap` rather than reached for ambiently. Unlike the
//! teacher's gateway, every field here is required — there is no partial
//! "not wired up yet" state once `bootstrap` returns.

use crate::agent::runtime::{default_decision_fn, AgentRuntime, DecisionFn};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db::Database;
use crate::escrow::bank::{BankRail, MockBank};
use crate::escrow::orchestrator::EscrowOrchestrator;
use crate::escrow::reconciler::EscrowReconciler;
use crate::idempotency::IdempotencyCache;
use crate::inventory::InventoryEngine;
use crate::kv::memory::MemoryKv;
use crate::kv::Kv;
use crate::lock::LockService;
use crate::order_lifecycle::OrderLifecycle;
use crate::protocol::txn_cache::TxnCache;
use crate::protocol::Coordinator;
use crate::verifier::oracle::{DiscomOracle, MockOracle};
use crate::verifier::worker::DeliveryVerifier;
use std::sync::Arc;

/// Everything a binary needs to serve the trade protocol and run the
/// background loops (spec §4 end to end). `Clone` is cheap: every field is
/// an `Arc` or a small value type.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub kv: Arc<dyn Kv>,
    pub locks: Arc<LockService>,
    pub inventory: Arc<InventoryEngine>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub escrow: Arc<EscrowOrchestrator>,
    pub idempotency: Arc<IdempotencyCache>,
    pub txn_cache: Arc<TxnCache>,
    pub coordinator: Arc<Coordinator>,
    pub verifier: Arc<DeliveryVerifier>,
    pub reconciler: Arc<EscrowReconciler>,
    pub agents: Arc<AgentRuntime>,
}

impl AppState {
    /// Connects to Postgres, brings the schema up to date, and wires every
    /// component together. `bank`/`oracle` default to the in-memory mocks
    /// (spec §6); a real deployment would pass concrete adapters here
    /// instead of changing any caller.
    pub async fn bootstrap(config: AppConfig, bap_id: &str, bap_uri: &str, domain: &str) -> anyhow::Result<Self> {
        Self::bootstrap_with(config, bap_id, bap_uri, domain, Arc::new(MockBank::new()), Arc::new(MockOracle::new(0.85))).await
    }

    pub async fn bootstrap_with(
        config: AppConfig,
        bap_id: &str,
        bap_uri: &str,
        domain: &str,
        bank: Arc<dyn BankRail>,
        oracle: Arc<dyn DiscomOracle>,
    ) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url, config.pg_pool_size).await?;
        db.run_schema_check().await?;
        let pool = db.pool().clone();

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let kv: Arc<dyn Kv> = Arc::new(MemoryKv::new());

        let locks = Arc::new(LockService::new(kv.clone(), config.lock_ttl, config.lock_max_retries, config.lock_retry_base_delay));
        let inventory = Arc::new(InventoryEngine::new(pool.clone(), locks.clone()));
        let lifecycle = Arc::new(OrderLifecycle::new(pool.clone(), locks.clone()));
        let escrow = Arc::new(EscrowOrchestrator::new(pool.clone(), locks.clone(), bank, clock.clone(), config.clone()));
        let idempotency = Arc::new(IdempotencyCache::new(kv.clone(), config.idempotency_ttl));
        let txn_cache = Arc::new(TxnCache::new(kv.clone(), config.txn_cache_ttl));

        let coordinator = Arc::new(Coordinator {
            pool: pool.clone(),
            locks: locks.clone(),
            inventory: inventory.clone(),
            lifecycle: lifecycle.clone(),
            escrow: escrow.clone(),
            idempotency: idempotency.clone(),
            txn_cache: txn_cache.clone(),
            clock: clock.clone(),
            bap_id: bap_id.to_string(),
            bap_uri: bap_uri.to_string(),
            domain: domain.to_string(),
        });

        let verifier = Arc::new(DeliveryVerifier::new(pool.clone(), oracle, lifecycle.clone(), clock.clone(), config.clone()));
        let reconciler = Arc::new(EscrowReconciler::new(pool.clone(), clock.clone(), config.verifier_check_interval));

        let decision_fn: Arc<DecisionFn> = Arc::new(default_decision_fn);
        let agents = Arc::new(AgentRuntime::new(pool.clone(), coordinator.clone(), decision_fn, clock.clone(), config.clone()));

        Ok(Self {
            config,
            clock,
            kv,
            locks,
            inventory,
            lifecycle,
            escrow,
            idempotency,
            txn_cache,
            coordinator,
            verifier,
            reconciler,
            agents,
        })
    }

    /// Spawn the delivery verifier, escrow reconciler, and agent runtime as
    /// background tasks. Returns their join handles so a caller can await
    /// shutdown or abort them in tests.
    pub fn spawn_background_loops(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let verifier = self.verifier.clone();
        let reconciler = self.reconciler.clone();
        let agents = self.agents.clone();
        let agent_interval = self.config.agent_tick_interval;

        vec![
            tokio::spawn(async move {
                verifier.run().await;
            }),
            tokio::spawn(async move {
                reconciler.run().await;
            }),
            tokio::spawn(async move {
                agents.run(agent_interval).await;
            }),
        ]
    }
}
