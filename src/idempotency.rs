//! Idempotency cache (spec §4.2).
//!
//! Keyed by `(endpoint, idempotency_key)`, three states: absent / processing
//! (a sentinel written with `set_nx`) / stored (the cached response, 24h TTL).
//! The same `Kv` primitive backs this and the distributed lock service; the
//! difference is purely in how the value is interpreted.

use crate::kv::Kv;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const PROCESSING_SENTINEL: &str = "__processing__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: String,
    pub body: serde_json::Value,
}

pub enum LookupOutcome {
    /// No record for this key — caller should proceed and call `store`/`release`.
    Fresh,
    /// A stored response exists — replay it verbatim.
    Replay(CachedResponse),
    /// Another in-flight request holds the processing sentinel.
    InProgress,
}

pub struct IdempotencyCache {
    kv: Arc<dyn Kv>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(kv: Arc<dyn Kv>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(endpoint: &str, idempotency_key: &str) -> String {
        format!("idem:{endpoint}:{idempotency_key}")
    }

    /// Step 1-3 of the middleware flow: read existing state, or attempt to
    /// claim the processing sentinel atomically.
    pub async fn begin(&self, endpoint: &str, idempotency_key: &str) -> LookupOutcome {
        let key = Self::key(endpoint, idempotency_key);

        if let Some(raw) = self.kv.get(&key).await {
            if raw == PROCESSING_SENTINEL {
                return LookupOutcome::InProgress;
            }
            return match serde_json::from_str::<CachedResponse>(&raw) {
                Ok(resp) => LookupOutcome::Replay(resp),
                Err(_) => LookupOutcome::Fresh,
            };
        }

        if self.kv.set_nx(&key, PROCESSING_SENTINEL, self.ttl).await {
            LookupOutcome::Fresh
        } else {
            // Lost the race to claim the sentinel.
            LookupOutcome::InProgress
        }
    }

    /// On handler success: atomically replace the sentinel with the stored
    /// response.
    pub async fn store(&self, endpoint: &str, idempotency_key: &str, response: CachedResponse) {
        let key = Self::key(endpoint, idempotency_key);
        let serialized = serde_json::to_string(&response).expect("CachedResponse is serializable");
        self.kv.set(&key, &serialized, self.ttl).await;
    }

    /// On handler failure: release the sentinel so retries may proceed.
    pub async fn release(&self, endpoint: &str, idempotency_key: &str) {
        let key = Self::key(endpoint, idempotency_key);
        self.kv.delete(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use serde_json::json;

    fn cache() -> IdempotencyCache {
        IdempotencyCache::new(Arc::new(MemoryKv::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn fresh_then_replay_after_store() {
        let cache = cache();
        assert!(matches!(
            cache.begin("confirm", "key-1").await,
            LookupOutcome::Fresh
        ));

        // A concurrent retry while processing sees in-progress.
        assert!(matches!(
            cache.begin("confirm", "key-1").await,
            LookupOutcome::InProgress
        ));

        let response = CachedResponse {
            status: "ok".to_string(),
            body: json!({"order_id": "o-1"}),
        };
        cache.store("confirm", "key-1", response.clone()).await;

        match cache.begin("confirm", "key-1").await {
            LookupOutcome::Replay(stored) => assert_eq!(stored, response),
            _ => panic!("expected replay"),
        }
    }

    #[tokio::test]
    async fn release_allows_retry_after_failure() {
        let cache = cache();
        assert!(matches!(
            cache.begin("confirm", "key-2").await,
            LookupOutcome::Fresh
        ));
        cache.release("confirm", "key-2").await;
        assert!(matches!(
            cache.begin("confirm", "key-2").await,
            LookupOutcome::Fresh
        ));
    }
}
