//! Agent/Proposal types and policy checks (spec §3 Agent, Proposal; §4.11).
//!
//! Pure data types plus a pure `Policy::evaluate` — no I/O, unit-tested the
//! way `trust.rs`/`matching.rs` are — so the execution decision (auto vs.
//! pending-approval) is testable independent of the runtime loop that
//! drives it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
    Stopped,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Auto,
    Approval,
}

impl ExecutionMode {
    pub fn from_str(s: &str) -> Self {
        if s == "auto" { ExecutionMode::Auto } else { ExecutionMode::Approval }
    }
}

/// `Agent.config` (spec §3): risk limits that gate auto-execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_price_per_unit: Decimal,
    pub min_trust_score: f64,
    pub max_qty: i64,
    pub daily_limit: Decimal,
    #[serde(default)]
    pub risk_tolerance: f64,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
    #[serde(default)]
    pub custom_instructions: String,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: i64,
    pub owner_id: i64,
    pub kind: AgentKind,
    pub status: AgentStatus,
    pub execution_mode: ExecutionMode,
    pub config: AgentConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalAction {
    Buy,
    Sell,
}

impl ProposalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalAction::Buy => "buy",
            ProposalAction::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Expired => "expired",
        }
    }
}

/// A candidate trade an agent's decision function emits from market state.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub agent_id: i64,
    pub action: ProposalAction,
    pub offer_id: Option<i64>,
    pub qty: i64,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub reasoning: String,
    /// Trust score of the offer's provider, used by `Policy::evaluate`.
    pub provider_trust_score: f64,
}

/// Policy check result: whether a proposal may auto-execute.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

/// spec §4.11: "If `execution_mode=auto` and the proposal passes policy
/// (price cap, trust floor, daily limit), the agent invokes the buyer-side
/// coordinator to execute; otherwise the proposal is persisted as
/// `pending`." `spent_today` is the caller-tracked running total against
/// `config.daily_limit`.
pub fn evaluate(config: &AgentConfig, proposal: &Proposal, spent_today: Decimal) -> PolicyDecision {
    if proposal.qty > config.max_qty {
        return PolicyDecision::Deny(format!(
            "requested qty {} exceeds agent max_qty {}",
            proposal.qty, config.max_qty
        ));
    }
    if proposal.price_per_unit > config.max_price_per_unit {
        return PolicyDecision::Deny(format!(
            "price {} exceeds agent max_price_per_unit {}",
            proposal.price_per_unit, config.max_price_per_unit
        ));
    }
    if proposal.provider_trust_score < config.min_trust_score {
        return PolicyDecision::Deny(format!(
            "provider trust {:.2} below agent floor {:.2}",
            proposal.provider_trust_score, config.min_trust_score
        ));
    }
    if spent_today + proposal.total_price > config.daily_limit {
        return PolicyDecision::Deny(format!(
            "total_price {} would exceed daily_limit {} (already spent {})",
            proposal.total_price, config.daily_limit, spent_today
        ));
    }
    PolicyDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            max_price_per_unit: "10".parse().unwrap(),
            min_trust_score: 0.5,
            max_qty: 20,
            daily_limit: "1000".parse().unwrap(),
            risk_tolerance: 0.5,
            preferred_sources: vec![],
            custom_instructions: String::new(),
        }
    }

    fn proposal() -> Proposal {
        Proposal {
            agent_id: 1,
            action: ProposalAction::Buy,
            offer_id: Some(42),
            qty: 5,
            price_per_unit: "6".parse().unwrap(),
            total_price: "30".parse().unwrap(),
            reasoning: "cheap and reliable".to_string(),
            provider_trust_score: 0.8,
        }
    }

    #[test]
    fn allows_proposal_within_all_limits() {
        assert_eq!(evaluate(&config(), &proposal(), Decimal::ZERO), PolicyDecision::Allow);
    }

    #[test]
    fn denies_over_price_cap() {
        let mut p = proposal();
        p.price_per_unit = "11".parse().unwrap();
        assert!(matches!(evaluate(&config(), &p, Decimal::ZERO), PolicyDecision::Deny(_)));
    }

    #[test]
    fn denies_under_trust_floor() {
        let mut p = proposal();
        p.provider_trust_score = 0.1;
        assert!(matches!(evaluate(&config(), &p, Decimal::ZERO), PolicyDecision::Deny(_)));
    }

    #[test]
    fn denies_over_qty_cap() {
        let mut p = proposal();
        p.qty = 100;
        assert!(matches!(evaluate(&config(), &p, Decimal::ZERO), PolicyDecision::Deny(_)));
    }

    #[test]
    fn denies_when_daily_limit_would_be_exceeded() {
        let p = proposal();
        let spent = "980".parse().unwrap();
        assert!(matches!(evaluate(&config(), &p, spent), PolicyDecision::Deny(_)));
    }
}
