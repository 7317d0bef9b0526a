//! In-process `Kv` implementation.
//!
//! A `DashMap` keyed by the string key, storing value + absolute expiry.
//! A background sweeper evicts expired entries periodically so long-running
//! processes don't accumulate garbage between reads, mirroring the teacher's
//! use of `dashmap` for shared concurrent state (`gateway/state.rs`) plus the
//! TTL-cache idea behind the `cached` dependency in its `Cargo.toml`.

use super::Kv;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct MemoryKv {
    map: Arc<DashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
        }
    }

    /// Spawn a background task that periodically removes expired entries.
    /// Returns a `JoinHandle` the caller may keep to cancel the sweeper on
    /// shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let map = self.map.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                map.retain(|_, entry| entry.expires_at > now);
            }
        })
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        // Clear a stale (expired) entry first so set_nx still wins after TTL.
        if let Some(existing) = self.map.get(key) {
            if Self::is_live(&existing) {
                return false;
            }
        }
        let expires_at = Instant::now() + ttl;
        match self.map.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) if !Self::is_live(occ.get()) => {
                occ.insert(Entry {
                    value: value.to_string(),
                    expires_at,
                });
                true
            }
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                vac.insert(Entry {
                    value: value.to_string(),
                    expires_at,
                });
                true
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn get(&self, key: &str) -> Option<String> {
        match self.map.get(key) {
            Some(entry) if Self::is_live(&entry) => Some(entry.value.clone()),
            _ => None,
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    async fn cas(&self, key: &str, expected: &str, new: &str, ttl: Duration) -> bool {
        match self.map.get_mut(key) {
            Some(mut entry) if Self::is_live(&entry) && entry.value == expected => {
                entry.value = new.to_string();
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.map.get_mut(key) {
            Some(mut entry) if Self::is_live(&entry) => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    async fn incr(&self, key: &str) -> i64 {
        let mut entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: Instant::now() + Duration::from_secs(365 * 24 * 3600),
            });
        let next: i64 = entry.value.parse().unwrap_or(0) + 1;
        entry.value = next.to_string();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(kv.get("k").await, None);
    }

    #[tokio::test]
    async fn set_nx_wins_after_expiry() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "a", Duration::from_millis(10)).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv.set_nx("k", "b", Duration::from_secs(5)).await);
        assert_eq!(kv.get("k").await, Some("b".to_string()));
    }

    #[tokio::test]
    async fn sweeper_evicts_expired_entries() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Duration::from_millis(10)).await;
        let handle = kv.spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(kv.map.len(), 0);
        handle.abort();
    }
}
