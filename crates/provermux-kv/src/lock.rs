// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key TTL-bounded mutual exclusion.
//!
//! A lock is identified by a random nonce so only its holder can extend or
//! release it — mirrors `redis.lock.Lock`'s token scheme from
//! `original_source/inference/sessions.py::acquire_pet_lock`.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, KvError};

/// A held lock on one KV key. Dropping this without calling [`Self::release`]
/// leaves the lock to expire on its own TTL, since the owning `call()`
/// always releases from a `finally`-equivalent path.
pub struct KvLock<B: Backend + ?Sized> {
    backend: Arc<B>,
    key: String,
    token: String,
}

impl<B: Backend + ?Sized> KvLock<B> {
    /// Attempt to acquire `key` with initial expiry `ttl`. Blocks (via
    /// retry with backoff) up to `wait` before giving up.
    pub async fn acquire(
        backend: Arc<B>,
        key: impl Into<String>,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Self, KvError> {
        let key = key.into();
        let token = uuid::Uuid::new_v4().simple().to_string();
        let deadline = tokio::time::Instant::now() + wait;
        let retry_delay = Duration::from_millis(20);

        loop {
            if backend.try_lock(&key, &token, ttl).await? {
                return Ok(Self {
                    backend,
                    key,
                    token,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(KvError::Protocol(format!("lock busy: {key}")));
            }
            tokio::time::sleep(retry_delay).await;
        }
    }

    /// Extend this lock's TTL to `ttl`, replacing (not adding to) the
    /// current expiry.
    pub async fn extend(&self, ttl: Duration) -> Result<(), KvError> {
        self.backend.extend_lock(&self.key, &self.token, ttl).await?;
        Ok(())
    }

    /// Release the lock. A release that fails because the TTL already
    /// expired is not an error: the lock is effectively released either
    /// way.
    pub async fn release(self) {
        let _ = self.backend.unlock(&self.key, &self.token).await;
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let backend = Arc::new(FakeBackend::new());
        let _lock = KvLock::acquire(
            Arc::clone(&backend),
            "pet_lock:0",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await
        .expect("first acquire");

        let second = KvLock::acquire(
            Arc::clone(&backend),
            "pet_lock:0",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn release_allows_reacquire() {
        let backend = Arc::new(FakeBackend::new());
        let lock = KvLock::acquire(
            Arc::clone(&backend),
            "pet_lock:0",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await
        .expect("first acquire");
        lock.release().await;

        let second = KvLock::acquire(
            Arc::clone(&backend),
            "pet_lock:0",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn foreign_token_cannot_extend_or_unlock() {
        let backend = Arc::new(FakeBackend::new());
        let _lock = KvLock::acquire(
            Arc::clone(&backend),
            "pet_lock:0",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await
        .expect("acquire");

        assert!(!backend
            .extend_lock("pet_lock:0", "not-the-real-token", Duration::from_secs(1))
            .await
            .expect("extend call"));
        assert!(!backend
            .unlock("pet_lock:0", "not-the-real-token")
            .await
            .expect("unlock call"));
    }
}
