//! Escrow orchestrator (spec §4.7): the step-labelled state machine over
//! `onTradePlaced`/`onTradeVerified`. Every stage below logs a structured
//! `tracing` span — the "step-labelled state machine... emit a structured
//! log group" spec calls for — so a failed run is forensically
//! reproducible from logs alone, the way `TransferCoordinator::step_*`
//! logs before and after each external call.
//!
//! **Open question resolution** (recorded in DESIGN.md): spec §4.7 gives
//! `onTradeVerified` a binary `{SUCCESS, FAIL}` outcome while §4.8's
//! delivery verifier produces three (`FULL`/`PARTIAL`/`FAILED`), none of
//! which refund the buyer — even a zero-delivery order still pays the
//! "to-grid" portion rather than returning funds. We map all three
//! delivery outcomes to `VerifyOutcome::Success` (money moves, possibly
//! mostly to the grid) and reserve `VerifyOutcome::Fail` (refund) for
//! pre-delivery cancellation paths, which call this orchestrator directly.

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::db::escrow::{self, EscrowStatus};
use crate::db::transfers::{self, TransferKind};
use crate::db::users;
use crate::error::{Error, Result};
use crate::escrow::bank::{BankRail, BlockReceipt, TransferReceipt};
use crate::lock::{self, LockService};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Fail,
}

#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub status: &'static str,
    pub principal: Decimal,
    pub fee: Decimal,
    pub total_blocked: Decimal,
    pub receipt: BlockReceipt,
    pub inserted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    PaymentReleased,
    PaymentRefunded,
    ErrorNoBlock,
    ErrorAlreadySettled,
    ErrorBlockExpired,
}

#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub status: VerifyStatus,
    pub bank_action: Option<TransferReceipt>,
}

pub struct EscrowOrchestrator {
    pool: PgPool,
    locks: Arc<LockService>,
    bank: Arc<dyn BankRail>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

/// `fee = min(cap, principal * rate)` (spec §4.7 step 1, §8 boundary test).
pub fn compute_fee(principal: Decimal, rate: Decimal, cap: Decimal) -> Decimal {
    (principal * rate).min(cap)
}

impl EscrowOrchestrator {
    pub fn new(pool: PgPool, locks: Arc<LockService>, bank: Arc<dyn BankRail>, clock: Arc<dyn Clock>, config: AppConfig) -> Self {
        Self { pool, locks, bank, clock, config }
    }

    /// spec §4.7 `onTradePlaced`. Debits the buyer's balance under
    /// `lock:payment:<buyer_id>` before calling the bank — this is where
    /// `InsufficientBalance` surfaces (spec §8 scenario 6): on that path
    /// no bank call happens and no escrow row is created.
    pub async fn on_trade_placed(
        &self,
        trade_id: i64,
        buyer_id: i64,
        seller_id: Option<i64>,
        principal: Decimal,
    ) -> Result<PlacementResult> {
        let fee = compute_fee(principal, self.config.escrow_fee_rate, self.config.escrow_fee_cap);
        let total_blocked = principal + fee;
        info!(trade_id, %principal, %fee, %total_blocked, "escrow step 1: fee computed");

        let resource = lock::keys::payment(&buyer_id.to_string());
        self.locks
            .with_lock(&resource, || async {
                users::debit(&self.pool, buyer_id, total_blocked).await?;
                info!(trade_id, buyer_id, "escrow step 2: buyer balance debited");
                Ok(())
            })
            .await?;

        let receipt = self
            .bank
            .block_funds(trade_id, total_blocked, self.config.escrow_block_duration)
            .await;
        info!(trade_id, block_id = %receipt.block_id, "escrow step 3: bank block confirmed");

        let expires_at = self.clock.now() + chrono::Duration::from_std(self.config.escrow_block_duration).unwrap();
        let (_, inserted) = escrow::insert_if_absent(
            &self.pool,
            trade_id,
            buyer_id,
            seller_id,
            principal,
            fee,
            total_blocked,
            expires_at,
            &receipt.block_id,
        )
        .await?;
        info!(trade_id, inserted, "escrow step 4: escrow row upserted");

        Ok(PlacementResult {
            status: "BLOCK_CONFIRMED",
            principal,
            fee,
            total_blocked,
            receipt,
            inserted,
        })
    }

    /// spec §4.7 `onTradeVerified`. Idempotent: a second call on an
    /// already-settled trade returns `ErrorAlreadySettled` with no bank
    /// action (spec §8 idempotence laws, property P3).
    pub async fn on_trade_verified(&self, trade_id: i64, outcome: VerifyOutcome) -> Result<VerifyResult> {
        let Some(row) = escrow::get(&self.pool, trade_id).await? else {
            info!(trade_id, "escrow verify step 1: no block found");
            return Ok(VerifyResult { status: VerifyStatus::ErrorNoBlock, bank_action: None });
        };

        if transfers::any_settlement_for_trade(&self.pool, trade_id).await? {
            info!(trade_id, "escrow verify step 1: already settled, replaying error");
            return Ok(VerifyResult { status: VerifyStatus::ErrorAlreadySettled, bank_action: None });
        }

        let status = EscrowStatus::from_str(&row.status).unwrap_or(EscrowStatus::Blocked);
        if status == EscrowStatus::Expired || row.expires_at < self.clock.now() {
            info!(trade_id, "escrow verify step 1: block expired");
            if status != EscrowStatus::Expired {
                escrow::set_status(&self.pool, trade_id, EscrowStatus::Expired).await?;
            }
            return Ok(VerifyResult { status: VerifyStatus::ErrorBlockExpired, bank_action: None });
        }

        match outcome {
            VerifyOutcome::Success => {
                let receipt = self.bank.release_funds(trade_id, row.principal).await;
                info!(trade_id, transfer_id = %receipt.transfer_id, "escrow verify step 2: bank release");
                transfers::insert_if_absent(&self.pool, trade_id, TransferKind::Release, row.principal).await?;
                escrow::set_status(&self.pool, trade_id, EscrowStatus::Released).await?;
                escrow::set_payout_receipt(&self.pool, trade_id, &receipt.transfer_id).await?;
                Ok(VerifyResult { status: VerifyStatus::PaymentReleased, bank_action: Some(receipt) })
            }
            VerifyOutcome::Fail => {
                let receipt = self.bank.refund_funds(trade_id, row.total_blocked).await;
                info!(trade_id, transfer_id = %receipt.transfer_id, "escrow verify step 2: bank refund");
                transfers::insert_if_absent(&self.pool, trade_id, TransferKind::Refund, row.total_blocked).await?;
                escrow::set_status(&self.pool, trade_id, EscrowStatus::Refunded).await?;
                let resource = lock::keys::payment(&row.buyer_id.to_string());
                self.locks
                    .with_lock(&resource, || async {
                        users::credit(&self.pool, row.buyer_id, row.total_blocked).await
                    })
                    .await?;
                Ok(VerifyResult { status: VerifyStatus::PaymentRefunded, bank_action: Some(receipt) })
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_respects_cap_and_rate() {
        // spec §8 boundary test: CAP=20, RATE=0.0003.
        let rate: Decimal = "0.0003".parse().unwrap();
        let cap: Decimal = "20".parse().unwrap();
        assert_eq!(compute_fee("66666.67".parse().unwrap(), rate, cap), cap);
        assert_eq!(compute_fee("1000".parse().unwrap(), rate, cap), "0.3".parse().unwrap());
    }
}
