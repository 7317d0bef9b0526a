//! Agent runtime loop (spec §4.11): one tick per active agent, gathering
//! market state, calling a pluggable decision function, persisting and
//! (when policy allows) auto-executing the resulting proposals through the
//! buyer-side coordinator.
//!
//! Grounded in the same periodic-loop shape as `verifier::worker::DeliveryVerifier`
//! and `escrow::reconciler::EscrowReconciler`: one `tokio::spawn`ed `run()`,
//! per-agent error isolation (spec §7 "one order's error must not abort the
//! loop" generalizes to "one agent's error must not abort the tick").

use crate::agent::proposal::{self, Agent, AgentConfig, AgentKind, AgentStatus, ExecutionMode, PolicyDecision, Proposal, ProposalAction};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::db::agents::{self, AgentRow};
use crate::db::{offers, providers};
use crate::error::Result;
use crate::matching::OfferCandidate;
use crate::protocol::envelope::{ConfirmMessage, DiscoverMessage, InitMessage, SelectMessage};
use crate::protocol::Coordinator;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Market state handed to a decision function: the active catalog plus a
/// provider-id -> trust-score map (spec §4.11 "gather market state (offers
/// matching agent criteria, recent trust signals)").
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub offers: Vec<OfferCandidate>,
    pub provider_trust: HashMap<String, f64>,
}

/// A pluggable decision function: deterministic or LLM-backed, spec §4.11
/// ("may be LLM-backed or deterministic"). Returns zero or more proposals.
pub type DecisionFn = dyn Fn(&Agent, &MarketSnapshot) -> Vec<Proposal> + Send + Sync;

pub struct AgentRuntime {
    pool: sqlx::PgPool,
    coordinator: Arc<Coordinator>,
    decision_fn: Arc<DecisionFn>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

fn parse_agent(row: &AgentRow) -> Result<Agent> {
    let config: AgentConfig = serde_json::from_value(row.config.clone())
        .map_err(|e| crate::error::Error::Internal(format!("agent {} has unreadable config: {e}", row.id)))?;
    let kind = if row.agent_type == "seller" { AgentKind::Seller } else { AgentKind::Buyer };
    let status = match row.status.as_str() {
        "paused" => AgentStatus::Paused,
        "stopped" => AgentStatus::Stopped,
        _ => AgentStatus::Active,
    };
    Ok(Agent {
        id: row.id,
        owner_id: row.owner_id,
        kind,
        status,
        execution_mode: ExecutionMode::from_str(&row.execution_mode),
        config,
    })
}

/// Deterministic default decision function (spec §4.11's non-LLM path):
/// a buyer agent proposes to buy the cheapest offer above its trust floor
/// and within its quantity/price caps; a seller agent has no counterpart
/// here since publishing a new offer is out of this runtime's scope (it
/// would require an `item`/`offer` creation flow the agent doesn't own —
/// recorded as an Open Question resolution in DESIGN.md).
pub fn default_decision_fn(agent: &Agent, market: &MarketSnapshot) -> Vec<Proposal> {
    if agent.kind != AgentKind::Buyer {
        return Vec::new();
    }

    let mut candidates: Vec<&OfferCandidate> = market
        .offers
        .iter()
        .filter(|o| o.price_per_unit <= agent.config.max_price_per_unit)
        .filter(|o| market.provider_trust.get(&o.provider_id).copied().unwrap_or(0.0) >= agent.config.min_trust_score)
        .collect();
    candidates.sort_by(|a, b| a.price_per_unit.cmp(&b.price_per_unit).then_with(|| a.offer_id.cmp(&b.offer_id)));

    let Some(best) = candidates.into_iter().next() else {
        return Vec::new();
    };

    let qty = best.max_qty.min(agent.config.max_qty).max(0);
    if qty == 0 {
        return Vec::new();
    }

    let offer_id = best.offer_id.parse::<i64>().ok();
    let trust = market.provider_trust.get(&best.provider_id).copied().unwrap_or(0.0);
    vec![Proposal {
        agent_id: agent.id,
        action: ProposalAction::Buy,
        offer_id,
        qty,
        price_per_unit: best.price_per_unit,
        total_price: best.price_per_unit * Decimal::from(qty),
        reasoning: format!(
            "lowest-priced offer ({}) within price cap {} and trust floor {:.2}",
            best.price_per_unit, agent.config.max_price_per_unit, agent.config.min_trust_score
        ),
        provider_trust_score: trust,
    }]
}

impl AgentRuntime {
    pub fn new(pool: sqlx::PgPool, coordinator: Arc<Coordinator>, decision_fn: Arc<DecisionFn>, clock: Arc<dyn Clock>, config: AppConfig) -> Self {
        Self { pool, coordinator, decision_fn, clock, config }
    }

    async fn build_snapshot(&self) -> Result<MarketSnapshot> {
        let now = self.clock.now();
        let catalog = offers::list_active(&self.pool, now).await?;

        let mut provider_trust = HashMap::new();
        for o in &catalog {
            let key = o.provider_id.to_string();
            if !provider_trust.contains_key(&key) {
                let trust = providers::get(&self.pool, o.provider_id).await?.map(|p| p.trust_score).unwrap_or(0.0);
                provider_trust.insert(key, trust);
            }
        }

        let candidates = catalog
            .into_iter()
            .map(|o| OfferCandidate {
                offer_id: o.id.to_string(),
                provider_id: o.provider_id.to_string(),
                price_per_unit: o.price_per_unit,
                max_qty: o.max_qty,
                window_start: o.window_start,
                window_end: o.window_end,
            })
            .collect();

        Ok(MarketSnapshot { offers: candidates, provider_trust })
    }

    /// One tick over every `status='active'` agent. A single agent's
    /// failure is logged and skipped (spec §7's isolation rule applied to
    /// the agent loop).
    pub async fn tick_all(&self) -> Result<usize> {
        let market = self.build_snapshot().await?;
        let rows = agents::list_active(&self.pool).await?;
        let mut ticked = 0;
        for row in rows {
            match self.tick_one(&row, &market).await {
                Ok(n) => ticked += n,
                Err(e) => warn!(agent_id = row.id, error = %e, "agent tick failed"),
            }
        }

        let expired = agents::expire_stale_pending(&self.pool, self.clock.now(), self.config.agent_proposal_ttl_secs).await?;
        if expired > 0 {
            info!(count = expired, "expired stale pending proposals");
        }

        Ok(ticked)
    }

    /// Tick a single agent: analyze, propose, persist, maybe auto-execute.
    /// Returns the number of proposals created.
    async fn tick_one(&self, row: &AgentRow, market: &MarketSnapshot) -> Result<usize> {
        let agent = parse_agent(row)?;
        if agent.status != AgentStatus::Active {
            return Ok(0);
        }

        let proposals = (self.decision_fn)(&agent, market);
        info!(agent_id = agent.id, proposals = proposals.len(), "agent analysis complete");

        let mut spent_today = self.spent_today(agent.id).await?;
        let mut created = 0;

        for proposal in proposals {
            let decision = proposal::evaluate(&agent.config, &proposal, spent_today);
            let auto = agent.execution_mode == ExecutionMode::Auto && decision == PolicyDecision::Allow;
            let status = if auto { "approved" } else { "pending" };

            let proposal_id = agents::insert(
                &self.pool,
                agent.id,
                proposal.action.as_str(),
                proposal.offer_id,
                proposal.qty,
                proposal.price_per_unit,
                proposal.total_price,
                &proposal.reasoning,
                status,
            )
            .await?;
            created += 1;
            info!(agent_id = agent.id, proposal_id, status, "proposal recorded");

            if let PolicyDecision::Deny(reason) = &decision {
                info!(agent_id = agent.id, proposal_id, reason, "proposal policy check failed, awaiting human decision");
            }

            if auto {
                spent_today += proposal.total_price;
                if let Err(e) = self.execute(proposal_id, &proposal, agent.owner_id).await {
                    error!(agent_id = agent.id, proposal_id, error = %e, "auto-execution failed");
                }
            }
        }

        Ok(created)
    }

    async fn spent_today(&self, agent_id: i64) -> Result<Decimal> {
        let since = self.clock.now() - chrono::Duration::hours(24);
        let total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(total_price) FROM proposals_tb WHERE agent_id = $1 AND status IN ('approved', 'executed') AND created_at > $2",
        )
        .bind(agent_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::Error::from)?;
        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Human approval for a `pending` proposal: same execution path as
    /// auto-execute (spec §4.11 "Human approval triggers the same
    /// execution path").
    pub async fn approve(&self, proposal_id: i64) -> Result<()> {
        let row = agents::get_proposal(&self.pool, proposal_id)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("proposal {proposal_id}")))?;
        let agent_row = agents::get(&self.pool, row.agent_id)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("agent {}", row.agent_id)))?;
        let proposal = Proposal {
            agent_id: row.agent_id,
            action: if row.action == "sell" { ProposalAction::Sell } else { ProposalAction::Buy },
            offer_id: row.offer_id,
            qty: row.qty,
            price_per_unit: row.price_per_unit,
            total_price: row.total_price,
            reasoning: row.reasoning,
            provider_trust_score: 1.0,
        };
        agents::mark_decided(&self.pool, proposal_id, "approved").await?;
        self.execute(proposal_id, &proposal, agent_row.owner_id).await
    }

    pub async fn reject(&self, proposal_id: i64) -> Result<()> {
        agents::mark_decided(&self.pool, proposal_id, "rejected").await
    }

    /// Drive the buyer-side coordinator's discover/select/init/confirm
    /// handshake for an approved proposal (spec §4.5/§4.11).
    async fn execute(&self, proposal_id: i64, proposal: &Proposal, buyer_id: i64) -> Result<()> {
        let Some(offer_id) = proposal.offer_id else {
            return Err(crate::error::Error::Validation("proposal has no offer_id to execute".to_string()));
        };
        let transaction_id = crate::clock::new_id().to_string();
        let now = self.clock.now();
        let raw = serde_json::json!({ "source": "agent_runtime", "proposal_id": proposal_id });

        let discover_msg = DiscoverMessage {
            requested_quantity: proposal.qty,
            window_start: now,
            window_end: now + chrono::Duration::hours(24),
        };
        crate::protocol::buyer::discover(&self.coordinator, &transaction_id, &crate::clock::new_id().to_string(), &discover_msg, &raw).await?;

        let select_msg = SelectMessage { offer_id: Some(offer_id), auto_match: None, quantity: proposal.qty };
        crate::protocol::buyer::select(
            &self.coordinator,
            &transaction_id,
            &crate::clock::new_id().to_string(),
            &select_msg,
            &raw,
            &self.config.matching_weights,
        )
        .await?;

        let init_msg = InitMessage { offer_id, quantity: proposal.qty, buyer_id: Some(buyer_id) };
        let init_response =
            crate::protocol::buyer::init(&self.coordinator, &transaction_id, &crate::clock::new_id().to_string(), &init_msg, &raw).await?;
        let order_id = init_response["order_id"]
            .as_i64()
            .ok_or_else(|| crate::error::Error::Internal("agent execution: init returned no order_id".to_string()))?;

        let confirm_msg = ConfirmMessage { order_id };
        crate::protocol::buyer::confirm(&self.coordinator, &transaction_id, &crate::clock::new_id().to_string(), &confirm_msg, &raw).await?;

        agents::mark_executed(&self.pool, proposal_id).await?;
        info!(proposal_id, order_id, "proposal auto-executed");
        Ok(())
    }

    /// Long-lived loop; one tick's failure never kills the task.
    pub async fn run(&self, tick_interval: std::time::Duration) -> ! {
        info!(interval_secs = tick_interval.as_secs(), "starting agent runtime");
        loop {
            if let Err(e) = self.tick_all().await {
                error!(error = %e, "agent runtime tick failed");
            }
            tokio::time::sleep(tick_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn agent(kind: AgentKind) -> Agent {
        Agent {
            id: 1,
            owner_id: 1,
            kind,
            status: AgentStatus::Active,
            execution_mode: ExecutionMode::Approval,
            config: AgentConfig {
                max_price_per_unit: "10".parse().unwrap(),
                min_trust_score: 0.5,
                max_qty: 20,
                daily_limit: "1000".parse().unwrap(),
                risk_tolerance: 0.5,
                preferred_sources: vec![],
                custom_instructions: String::new(),
            },
        }
    }

    fn candidate(id: &str, provider: &str, price: &str, qty: i64) -> OfferCandidate {
        let now = Utc::now();
        OfferCandidate {
            offer_id: id.to_string(),
            provider_id: provider.to_string(),
            price_per_unit: price.parse().unwrap(),
            max_qty: qty,
            window_start: now,
            window_end: now + chrono::Duration::hours(2),
        }
    }

    #[test]
    fn seller_agents_never_propose_via_default_decision() {
        let market = MarketSnapshot { offers: vec![candidate("o1", "p1", "5", 10)], provider_trust: HashMap::from([("p1".to_string(), 0.9)]) };
        assert!(default_decision_fn(&agent(AgentKind::Seller), &market).is_empty());
    }

    #[test]
    fn buyer_agent_picks_cheapest_qualifying_offer() {
        let market = MarketSnapshot {
            offers: vec![candidate("1", "p1", "8", 10), candidate("2", "p2", "5", 10)],
            provider_trust: HashMap::from([("p1".to_string(), 0.9), ("p2".to_string(), 0.9)]),
        };
        let proposals = default_decision_fn(&agent(AgentKind::Buyer), &market);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].offer_id, Some(2));
    }

    #[test]
    fn buyer_agent_skips_offers_below_trust_floor() {
        let market = MarketSnapshot { offers: vec![candidate("1", "p1", "5", 10)], provider_trust: HashMap::from([("p1".to_string(), 0.1)]) };
        assert!(default_decision_fn(&agent(AgentKind::Buyer), &market).is_empty());
    }
}
