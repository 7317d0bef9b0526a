//! Delivery verifier (spec §4.8) — the background reconciler that polls
//! orders whose delivery window has elapsed, invokes the oracle, then in
//! one DB transaction updates trust, releases escrow, applies penalties,
//! and emits history.
//!
//! Grounded in `sentinel::worker::SentinelWorker::run` /
//! `transfer::worker::RecoveryWorker::run`: a periodic loop, per-order
//! isolated failure handling (spec §7 "one order's error must not abort
//! the loop"), structured logging at every step.

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::db::feedback::DeliveryStatus;
use crate::db::orders::{self, OrderRow};
use crate::db::{offers, payments, providers, trust_history, users};
use crate::error::Result;
use crate::order_lifecycle::OrderLifecycle;
use crate::trust;
use crate::verifier::oracle::DiscomOracle;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct DeliveryVerifier {
    pool: PgPool,
    oracle: Arc<dyn DiscomOracle>,
    lifecycle: Arc<OrderLifecycle>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSummary {
    pub order_id: i64,
    pub status: DeliveryStatus,
    pub seller_payment: Decimal,
    pub to_grid: Decimal,
}

/// Payment split (spec §4.8 step 3). On FULL delivery the seller receives
/// the full order total. Otherwise `seller_payment` is floored at zero and
/// `to_grid` records the grid's notional backstop cost for the shortfall —
/// an audit figure, not money drawn from any escrowed balance (see the
/// resolution note in DESIGN.md).
pub fn split_payment(total_price: Decimal, delivered_qty: Decimal, expected_qty: Decimal, seller_rate: Decimal, grid_rate: Decimal) -> (Decimal, Decimal) {
    if expected_qty <= Decimal::ZERO || delivered_qty >= expected_qty {
        return (total_price, Decimal::ZERO);
    }
    let undelivered = expected_qty - delivered_qty;
    let grid_penalty = ((grid_rate - seller_rate) * undelivered).max(Decimal::ZERO);
    let seller_payment = (delivered_qty * seller_rate - grid_penalty).max(Decimal::ZERO);
    let to_grid = (undelivered * grid_rate - seller_payment).max(Decimal::ZERO);
    (seller_payment, to_grid)
}

impl DeliveryVerifier {
    pub fn new(pool: PgPool, oracle: Arc<dyn DiscomOracle>, lifecycle: Arc<OrderLifecycle>, clock: Arc<dyn Clock>, config: AppConfig) -> Self {
        Self { pool, oracle, lifecycle, clock, config }
    }

    /// Long-lived loop; one order's failure is logged and skipped, never
    /// fatal to the loop (spec §7).
    pub async fn run(&self) -> ! {
        info!(interval_secs = self.config.verifier_check_interval.as_secs(), "starting delivery verifier");
        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "delivery verifier pass failed");
            }
            tokio::time::sleep(self.config.verifier_check_interval).await;
        }
    }

    /// One pass: recover stuck drafts, verify elapsed orders, settle
    /// externally-hosted orders, sweep spent offers.
    pub async fn run_once(&self) -> Result<()> {
        let recovered = self.lifecycle.recover_stuck_drafts().await?;
        if recovered > 0 {
            info!(recovered, "promoted stuck DRAFT orders to ACTIVE");
        }

        let now = self.clock.now();

        let due = orders::find_awaiting_verification(&self.pool, now).await?;
        for order in due {
            if let Err(e) = self.process_order(&order).await {
                warn!(order_id = order.id, error = %e, "delivery verification failed for order");
            }
        }

        let externally_hosted = orders::find_externally_hosted_past_window(&self.pool, now).await?;
        for order in externally_hosted {
            if let Err(e) = orders::mark_completed_externally_settled(&self.pool, order.id).await {
                warn!(order_id = order.id, error = %e, "failed to settle externally-hosted order");
            } else {
                info!(order_id = order.id, "externally-hosted order settled");
            }
        }

        match offers::delete_spent(&self.pool, now).await {
            Ok(n) if n > 0 => info!(count = n, "spent offers cleaned up"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "offer cleanup sweep failed (non-fatal)"),
        }

        Ok(())
    }

    /// Verify a single order on demand, outside the periodic sweep (used by
    /// the `verify-trade` CLI command).
    pub async fn verify_order(&self, order_id: i64) -> Result<FeedbackSummary> {
        let order = orders::get(&self.pool, order_id)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("order {order_id}")))?;
        self.process_order(&order).await
    }

    async fn process_order(&self, order: &OrderRow) -> Result<FeedbackSummary> {
        let Some(provider_id) = order.provider_id else {
            return Err(crate::error::Error::Internal(format!("order {} has no provider for verification", order.id)));
        };
        let expected_qty = Decimal::from_i64(order.total_qty).unwrap_or(Decimal::ZERO);
        let outcome = self.oracle.verify(order.id, provider_id, expected_qty).await;
        info!(order_id = order.id, status = ?outcome.status, ratio = outcome.ratio, "oracle verification complete");
        self.process_feedback(order, provider_id, outcome.delivered_qty, expected_qty, outcome.status, outcome.ratio).await
    }

    /// spec §4.8 `process_feedback`: one DB transaction covering steps
    /// 1-9 (feedback row, trust update, payment split, seller/provider/
    /// buyer updates, order settlement, payment record).
    ///
    /// `provider_id` identifies the `providers_tb` row the oracle verified
    /// against; the user row that actually holds balance and trust for that
    /// provider is resolved separately, since `users_tb.id` and
    /// `providers_tb.id` are distinct key spaces (a provider's seller
    /// account links back via `users_tb.provider_id`).
    pub async fn process_feedback(
        &self,
        order: &OrderRow,
        provider_id: i64,
        delivered_qty: Decimal,
        expected_qty: Decimal,
        status: DeliveryStatus,
        ratio: f64,
    ) -> Result<FeedbackSummary> {
        let seller_rate = order
            .total_price
            .checked_div(Decimal::from_i64(order.total_qty.max(1)).unwrap_or(Decimal::ONE))
            .unwrap_or(Decimal::ZERO);

        let (seller_payment, to_grid) = split_payment(order.total_price, delivered_qty, expected_qty, seller_rate, self.config.grid_rate);

        let delivered_f = delivered_qty.to_f64().unwrap_or(0.0);
        let expected_f = expected_qty.to_f64().unwrap_or(0.0);

        let seller_row = users::get_by_provider_id(&self.pool, provider_id)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("seller user for provider {provider_id}")))?;
        let seller_user_id = seller_row.id;
        let seller_trust_update = trust::update_trust(&self.config, seller_row.trust_score, delivered_f, expected_f);

        let mut tx = self.pool.begin().await.map_err(crate::error::Error::from)?;

        crate::db::feedback::insert(&mut tx, order.id, provider_id, delivered_qty, expected_qty, ratio, status, seller_trust_update.trust_impact).await?;

        sqlx::query("UPDATE users_tb SET trust_score = $1, allowed_trade_limit = $2, balance = balance + $3 WHERE id = $4")
            .bind(seller_trust_update.new_score)
            .bind(seller_trust_update.new_limit)
            .bind(seller_payment)
            .bind(seller_user_id)
            .execute(&mut **tx)
            .await
            .map_err(crate::error::Error::from)?;

        trust_history::insert(
            &mut tx,
            seller_user_id,
            seller_row.trust_score,
            seller_trust_update.new_score,
            trust::allowed_trade_limit(seller_row.trust_score),
            seller_trust_update.new_limit,
            "delivery_verification",
            Some(order.id),
            &serde_json::json!({ "ratio": ratio, "status": status.as_str() }),
        )
        .await?;

        orders::mark_completed_released(&mut tx, order.id).await?;

        let was_full = status == DeliveryStatus::Full;
        providers::record_settlement(&mut tx, provider_id, seller_trust_update.new_score, was_full).await?;

        if let Some(buyer_id) = order.buyer_id {
            let buyer_row = users::get(&self.pool, buyer_id).await?;
            if let Some(buyer_row) = buyer_row {
                let bonus = trust::buyer_bonus(buyer_row.trust_score, was_full);
                sqlx::query("UPDATE users_tb SET trust_score = $1, allowed_trade_limit = $2 WHERE id = $3")
                    .bind(bonus.new_score)
                    .bind(bonus.new_limit)
                    .bind(buyer_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(crate::error::Error::from)?;
                trust_history::insert(
                    &mut tx,
                    buyer_id,
                    buyer_row.trust_score,
                    bonus.new_score,
                    trust::allowed_trade_limit(buyer_row.trust_score),
                    bonus.new_limit,
                    "delivery_completion_bonus",
                    Some(order.id),
                    &serde_json::json!({ "full_delivery": was_full }),
                )
                .await?;
            }
        }

        payments::insert(
            &mut tx,
            order.id,
            order.buyer_id,
            Some(provider_id),
            crate::db::payments::PaymentType::Release,
            order.total_price,
            None,
            Some(seller_payment),
            None,
            Some(to_grid),
            "COMPLETED",
        )
        .await?;

        tx.commit().await.map_err(crate::error::Error::from)?;

        info!(order_id = order.id, %seller_payment, %to_grid, status = status.as_str(), "delivery feedback processed");

        Ok(FeedbackSummary { order_id: order.id, status, seller_payment, to_grid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_delivery_pays_total_with_no_grid_share() {
        let (seller, grid) = split_payment("60".parse().unwrap(), "10".parse().unwrap(), "10".parse().unwrap(), "6".parse().unwrap(), "10".parse().unwrap());
        assert_eq!(seller, "60".parse().unwrap());
        assert_eq!(grid, Decimal::ZERO);
    }

    #[test]
    fn partial_delivery_matches_spec_scenario_3() {
        // spec §8 scenario 3: expected 10, delivered 5, seller_rate=6, grid_rate=10.
        let (seller, grid) = split_payment("60".parse().unwrap(), "5".parse().unwrap(), "10".parse().unwrap(), "6".parse().unwrap(), "10".parse().unwrap());
        assert_eq!(seller, "10".parse().unwrap());
        assert_eq!(grid, "40".parse().unwrap());
    }

    #[test]
    fn total_failure_floors_seller_payment_at_zero() {
        let (seller, _grid) = split_payment("60".parse().unwrap(), Decimal::ZERO, "10".parse().unwrap(), "6".parse().unwrap(), "10".parse().unwrap());
        assert_eq!(seller, Decimal::ZERO);
    }
}
