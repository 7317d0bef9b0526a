//! Escrow orchestrator (spec §4.7): blocks buyer funds at trade placement,
//! releases or refunds them based on a verification outcome, all idempotent
//! and auditable through the `escrow_tb`/`transfers_tb` tables.

pub mod bank;
pub mod orchestrator;
pub mod reconciler;
