//! Transaction-state cache: the ephemeral, KV-backed "Transaction state"
//! entity from the glossary. Advisory only — recreated on demand from
//! durable event/order rows, never authoritative (spec §5 "Shared
//! resources", §9 "Global singletons"). 24h TTL per spec §4.5.

use crate::kv::Kv;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxnStatus {
    Discovering,
    Selecting,
    Initializing,
    Confirming,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnState {
    pub transaction_id: String,
    pub status: TxnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_offer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_qty: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_criteria: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

pub struct TxnCache {
    kv: Arc<dyn Kv>,
    ttl: Duration,
}

impl TxnCache {
    pub fn new(kv: Arc<dyn Kv>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(transaction_id: &str) -> String {
        format!("txn:{transaction_id}")
    }

    pub async fn get(&self, transaction_id: &str) -> Option<TxnState> {
        let raw = self.kv.get(&Self::key(transaction_id)).await?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn put(&self, state: &TxnState) {
        let raw = serde_json::to_string(state).expect("TxnState is serializable");
        self.kv.set(&Self::key(&state.transaction_id), &raw, self.ttl).await;
    }

    /// Start a fresh DISCOVERING record, overwriting any prior state for
    /// this transaction_id (spec §4.5 discover handler).
    pub async fn start_discovery(&self, transaction_id: &str, criteria: serde_json::Value, now: DateTime<Utc>) -> TxnState {
        let state = TxnState {
            transaction_id: transaction_id.to_string(),
            status: TxnStatus::Discovering,
            catalog: None,
            selected_offer_id: None,
            selected_qty: None,
            order_id: None,
            discovery_criteria: Some(criteria),
            updated_at: now,
        };
        self.put(&state).await;
        state
    }

    pub async fn record_catalog(&self, transaction_id: &str, catalog: serde_json::Value, now: DateTime<Utc>) {
        if let Some(mut state) = self.get(transaction_id).await {
            state.catalog = Some(catalog);
            state.status = TxnStatus::Selecting;
            state.updated_at = now;
            self.put(&state).await;
        }
    }

    pub async fn record_selection(&self, transaction_id: &str, offer_id: i64, qty: i64, now: DateTime<Utc>) {
        if let Some(mut state) = self.get(transaction_id).await {
            state.selected_offer_id = Some(offer_id);
            state.selected_qty = Some(qty);
            state.status = TxnStatus::Initializing;
            state.updated_at = now;
            self.put(&state).await;
        }
    }

    pub async fn record_order(&self, transaction_id: &str, order_id: i64, status: TxnStatus, now: DateTime<Utc>) {
        if let Some(mut state) = self.get(transaction_id).await {
            state.order_id = Some(order_id);
            state.status = status;
            state.updated_at = now;
            self.put(&state).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    fn cache() -> TxnCache {
        TxnCache::new(Arc::new(MemoryKv::new()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn discovery_then_selection_progresses_status() {
        let cache = cache();
        let now = Utc::now();
        cache.start_discovery("txn-1", serde_json::json!({"qty": 5}), now).await;
        cache.record_catalog("txn-1", serde_json::json!([{"offer_id": 1}]), now).await;

        let state = cache.get("txn-1").await.unwrap();
        assert_eq!(state.status, TxnStatus::Selecting);

        cache.record_selection("txn-1", 1, 5, now).await;
        let state = cache.get("txn-1").await.unwrap();
        assert_eq!(state.status, TxnStatus::Initializing);
        assert_eq!(state.selected_offer_id, Some(1));
    }

    #[tokio::test]
    async fn missing_transaction_returns_none() {
        let cache = cache();
        assert!(cache.get("nope").await.is_none());
    }
}
