//! Bank rail abstraction (spec §6 "Bank rail contract"). The core never
//! talks to a real payment rail — only this trait's two-call contract
//! matters: `block`, `release`, `refund`, each deterministic and
//! idempotent under the same `trade_id`. Grounded directly in
//! `transfer::adapters::ServiceAdapter`/`MockAdapter`: a trait the
//! orchestrator depends on, and an in-memory mock that records calls for
//! assertions instead of moving real money.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReceipt {
    pub block_id: String,
    pub blocked_amount: Decimal,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub amount: Decimal,
    pub status: &'static str,
}

#[async_trait]
pub trait BankRail: Send + Sync {
    /// Block `total` against `trade_id` for `duration`. Deterministic
    /// `block_id` (e.g. `blk_<trade_id>`) so a retried call returns the
    /// same receipt rather than double-blocking.
    async fn block_funds(&self, trade_id: i64, total: Decimal, duration: Duration) -> BlockReceipt;

    async fn release_funds(&self, trade_id: i64, amount: Decimal) -> TransferReceipt;

    async fn refund_funds(&self, trade_id: i64, amount: Decimal) -> TransferReceipt;
}

/// In-memory mock bank: deterministic ids, no real money movement, and a
/// record of every call so tests can assert on call counts the way
/// `transfer::adapters::mock::MockAdapter` tracks `withdraw_count`.
#[derive(Default)]
pub struct MockBank {
    calls: Mutex<HashMap<i64, Vec<String>>>,
}

impl MockBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_for(&self, trade_id: i64) -> Vec<String> {
        self.calls.lock().unwrap().get(&trade_id).cloned().unwrap_or_default()
    }

    fn record(&self, trade_id: i64, call: &str) {
        self.calls.lock().unwrap().entry(trade_id).or_default().push(call.to_string());
    }
}

#[async_trait]
impl BankRail for MockBank {
    async fn block_funds(&self, trade_id: i64, total: Decimal, _duration: Duration) -> BlockReceipt {
        self.record(trade_id, "block");
        BlockReceipt {
            block_id: format!("blk_{trade_id}"),
            blocked_amount: total,
            status: "BLOCKED",
        }
    }

    async fn release_funds(&self, trade_id: i64, amount: Decimal) -> TransferReceipt {
        self.record(trade_id, "release");
        TransferReceipt {
            transfer_id: format!("rel_{trade_id}"),
            amount,
            status: "PAID",
        }
    }

    async fn refund_funds(&self, trade_id: i64, amount: Decimal) -> TransferReceipt {
        self.record(trade_id, "refund");
        TransferReceipt {
            transfer_id: format!("rfd_{trade_id}"),
            amount,
            status: "REFUNDED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn block_id_is_deterministic_per_trade() {
        let bank = MockBank::new();
        let r1 = bank.block_funds(42, "100".parse().unwrap(), Duration::from_secs(60)).await;
        let r2 = bank.block_funds(42, "100".parse().unwrap(), Duration::from_secs(60)).await;
        assert_eq!(r1.block_id, r2.block_id);
        assert_eq!(bank.calls_for(42).len(), 2);
    }
}
