//! Escrow reconciler (spec §4.7 "Reconciler"): sweeps `BLOCKED` rows past
//! `expires_at` into `EXPIRED`, grounded in `transfer::worker::RecoveryWorker`'s
//! scan-then-fix shape — a periodic `tokio::spawn`ed loop, isolated failure
//! per scan, structured logging of what it found.

use crate::clock::Clock;
use crate::db::escrow;
use crate::error::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct EscrowReconciler {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    scan_interval: Duration,
}

impl EscrowReconciler {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, scan_interval: Duration) -> Self {
        Self { pool, clock, scan_interval }
    }

    /// One sweep: returns the trade ids transitioned to EXPIRED.
    pub async fn scan_once(&self) -> Result<Vec<i64>> {
        let expired = escrow::expire_lapsed(&self.pool, self.clock.now()).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), trade_ids = ?expired, "escrow rows expired");
        }
        Ok(expired)
    }

    /// Long-lived loop; one scan's failure never kills the task.
    pub async fn run(&self) -> ! {
        info!(interval_secs = self.scan_interval.as_secs(), "starting escrow reconciler");
        loop {
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "escrow reconciler scan failed");
            }
            tokio::time::sleep(self.scan_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a real database in tests/escrow_flow.rs (scenario 5,
    // "Expired escrow" from spec §8).
}
