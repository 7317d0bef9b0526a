//! Distributed lock service (spec §4.1).
//!
//! Exclusive leases over the `Kv` abstraction: `set_nx(resource, token, ttl)`
//! to acquire, a unique `token` so only the holder can release/extend, and a
//! background auto-extend task while the guard is held. Bounded retries with
//! jittered backoff on contention, fail-stop on `Kv` unavailability (callers
//! must surface the error, never silently proceed — spec §4.1's failure mode).
//!
//! Named keys follow spec §4.1: `lock:offer:<id>`, `lock:order:<id>`,
//! `lock:txn:<id>`, `lock:payment:<user_id>`, `lock:block:<id>`.

use crate::clock::new_id;
use crate::error::{Error, Result};
use crate::kv::Kv;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const EXTEND_THRESHOLD: Duration = Duration::from_millis(500);

pub struct LockService {
    kv: Arc<dyn Kv>,
    ttl: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

/// RAII guard: releases the lease and stops auto-extension on drop.
pub struct LockGuard {
    kv: Arc<dyn Kv>,
    resource: String,
    token: String,
    extend_task: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.extend_task.take() {
            handle.abort();
        }
        let kv = self.kv.clone();
        let resource = self.resource.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            // Only release if we still hold it (best-effort CAS-delete via
            // a throwaway CAS to a sentinel we immediately delete).
            if kv.get(&resource).await.as_deref() == Some(token.as_str()) {
                kv.delete(&resource).await;
            }
        });
    }
}

impl LockService {
    pub fn new(kv: Arc<dyn Kv>, ttl: Duration, max_retries: u32, retry_base_delay: Duration) -> Self {
        Self {
            kv,
            ttl,
            max_retries,
            retry_base_delay,
        }
    }

    fn key(resource: &str) -> String {
        resource.to_string()
    }

    /// Attempt to acquire the lease exactly once; no retry.
    pub async fn try_lock(&self, resource: &str) -> Result<LockGuard> {
        let token = new_id().to_string();
        let key = Self::key(resource);
        if !self.kv.set_nx(&key, &token, self.ttl).await {
            return Err(Error::LockAcquisition(resource.to_string()));
        }
        Ok(self.spawn_guard(key, token))
    }

    /// Acquire with bounded retry and jittered backoff, per spec §4.1
    /// ("retries capped at ~5 with exponential-ish backoff plus jitter").
    pub async fn acquire(&self, resource: &str) -> Result<LockGuard> {
        let token = new_id().to_string();
        let key = Self::key(resource);

        for attempt in 0..=self.max_retries {
            if self.kv.set_nx(&key, &token, self.ttl).await {
                return Ok(self.spawn_guard(key, token));
            }
            if attempt == self.max_retries {
                break;
            }
            let backoff = self.retry_base_delay * 2u32.pow(attempt);
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=10));
            debug!(resource, attempt, "lock contended, backing off");
            tokio::time::sleep(backoff + jitter).await;
        }

        warn!(resource, "failed to acquire lock after retries");
        Err(Error::LockAcquisition(resource.to_string()))
    }

    /// Run `f` while holding the lease on `resource`, releasing it
    /// unconditionally afterward (success, error, or panic via `Drop`).
    pub async fn with_lock<F, Fut, T>(&self, resource: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let _guard = self.acquire(resource).await?;
        f().await
    }

    fn spawn_guard(&self, key: String, token: String) -> LockGuard {
        let kv = self.kv.clone();
        let ttl = self.ttl;
        let extend_key = key.clone();
        let extend_token = token.clone();
        let extend_task = tokio::spawn(async move {
            let tick = ttl.saturating_sub(EXTEND_THRESHOLD).max(Duration::from_millis(50));
            loop {
                tokio::time::sleep(tick).await;
                if kv.get(&extend_key).await.as_deref() != Some(extend_token.as_str()) {
                    break;
                }
                if !kv.expire(&extend_key, ttl).await {
                    break;
                }
            }
        });
        LockGuard {
            kv: self.kv.clone(),
            resource: key,
            token,
            extend_task: Some(extend_task),
        }
    }
}

pub mod keys {
    pub fn offer(id: &str) -> String {
        format!("lock:offer:{id}")
    }
    pub fn order(id: &str) -> String {
        format!("lock:order:{id}")
    }
    pub fn txn(id: &str) -> String {
        format!("lock:txn:{id}")
    }
    pub fn payment(user_id: &str) -> String {
        format!("lock:payment:{user_id}")
    }
    pub fn block(id: &str) -> String {
        format!("lock:block:{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    fn service() -> LockService {
        LockService::new(
            Arc::new(MemoryKv::new()),
            Duration::from_millis(200),
            3,
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn exclusive_acquire_blocks_second_caller() {
        let svc = service();
        let guard = svc.try_lock("lock:offer:1").await.unwrap();
        assert!(svc.try_lock("lock:offer:1").await.is_err());
        drop(guard);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(svc.try_lock("lock:offer:1").await.is_ok());
    }

    #[tokio::test]
    async fn with_lock_releases_on_success_and_error() {
        let svc = service();
        let ok: Result<()> = svc.with_lock("lock:order:1", || async { Ok(()) }).await;
        assert!(ok.is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err_result: Result<()> = svc
            .with_lock("lock:order:1", || async {
                Err(Error::Internal("boom".into()))
            })
            .await;
        assert!(err_result.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(svc.try_lock("lock:order:1").await.is_ok());
    }

    #[tokio::test]
    async fn acquire_retries_then_fails_on_sustained_contention() {
        let svc = service();
        let _holder = svc.try_lock("lock:offer:2").await.unwrap();
        let result = svc.acquire("lock:offer:2").await;
        assert!(matches!(result, Err(Error::LockAcquisition(_))));
    }
}
