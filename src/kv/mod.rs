//! Key-value store abstraction.
//!
//! TTL'd strings with atomic set-if-absent and counters — the primitive
//! the lock service, idempotency cache, and transaction-state cache are all
//! built on (spec §2, §4.1, §4.2). The trait is the swap point for a real
//! deployment to plug in Redis without touching any caller; `memory::MemoryKv`
//! is the in-process reference implementation used here and in tests.

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Kv: Send + Sync {
    /// Set `key` to `value` with `ttl`, only if `key` does not already exist.
    /// Returns `true` if this call won (set the value), `false` if the key
    /// was already present.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Unconditional set with TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration);

    async fn get(&self, key: &str) -> Option<String>;

    /// Delete a key; returns true if it existed.
    async fn delete(&self, key: &str) -> bool;

    /// Compare-and-swap: replace `key`'s value with `new` only if its
    /// current value equals `expected`. Returns true on success.
    async fn cas(&self, key: &str, expected: &str, new: &str, ttl: Duration) -> bool;

    /// Extend a key's TTL if it still exists. Returns true if extended.
    async fn expire(&self, key: &str, ttl: Duration) -> bool;

    /// Atomically increment a counter key (creating it at 0 if absent) and
    /// return the new value.
    async fn incr(&self, key: &str) -> i64;
}

#[cfg(test)]
mod trait_tests {
    use super::memory::MemoryKv;
    use super::*;

    #[tokio::test]
    async fn set_nx_is_exclusive() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "a", Duration::from_secs(5)).await);
        assert!(!kv.set_nx("k", "b", Duration::from_secs(5)).await);
        assert_eq!(kv.get("k").await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn cas_only_succeeds_on_match() {
        let kv = MemoryKv::new();
        kv.set("k", "1", Duration::from_secs(5)).await;
        assert!(!kv.cas("k", "wrong", "2", Duration::from_secs(5)).await);
        assert!(kv.cas("k", "1", "2", Duration::from_secs(5)).await);
        assert_eq!(kv.get("k").await, Some("2".to_string()));
    }

    #[tokio::test]
    async fn incr_creates_and_counts() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("c").await, 1);
        assert_eq!(kv.incr("c").await, 2);
    }
}
