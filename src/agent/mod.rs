//! Agent runtime (spec §4.11, optional) — autonomous buyers/sellers that
//! produce `Proposal`s from market state under configured risk limits.
//! Proposals auto-execute through the buyer-side coordinator (§4.5) or
//! await human approval, depending on `execution_mode`.
//!
//! Grounded in the same periodic-`tokio::spawn`-loop shape as the delivery
//! verifier (`verifier::worker::DeliveryVerifier`) and escrow reconciler
//! (`escrow::reconciler::EscrowReconciler`): one tick per agent, per-agent
//! error isolation so one misbehaving agent never halts the others.

pub mod proposal;
pub mod runtime;

pub use proposal::{Agent, AgentConfig, AgentStatus, ExecutionMode, Proposal, ProposalAction, ProposalStatus};
pub use runtime::{AgentRuntime, DecisionFn, MarketSnapshot};
