// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`Backend`] for tests — no real Redis required.
//!
//! Mirrors the role of `oj-adapters`'s `test-support`-gated fakes: a drop-in
//! replacement with the exact same trait surface so replay/restart logic can
//! be exercised deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::backend::{Backend, KvError, Subscription};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    store: HashMap<String, Entry>,
    channels: HashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl Inner {
    fn is_live(&self, key: &str) -> bool {
        match self.store.get(key) {
            Some(entry) => entry.expires_at.map_or(true, |t| Instant::now() < t),
            None => false,
        }
    }

    fn get_live(&mut self, key: &str) -> Option<&Entry> {
        if !self.is_live(key) {
            self.store.remove(key);
            return None;
        }
        self.store.get(key)
    }
}

/// An in-memory stand-in for a real KV store, used by tests across the
/// workspace (behind the `test-support` feature).
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut inner = self.inner.lock();
        Ok(inner.get_live(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut inner = self.inner.lock();
        inner.store.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut inner = self.inner.lock();
        inner.store.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut inner = self.inner.lock();
        let current = inner
            .get_live(key)
            .and_then(|e| std::str::from_utf8(&e.value).ok()?.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        inner.store.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn append_list(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut inner = self.inner.lock();
        let mut list: Vec<Vec<u8>> = inner
            .get_live(key)
            .and_then(|e| serde_json::from_slice(&e.value).ok())
            .unwrap_or_default();
        list.push(value.to_vec());
        let bytes = serde_json::to_vec(&list)
            .map_err(|e| KvError::Protocol(format!("append_list encode: {e}")))?;
        inner.store.insert(
            key.to_string(),
            Entry {
                value: bytes,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let inner = self.inner.lock();
        let prefix = pattern.strip_suffix('*');
        let matches = |key: &str| match prefix {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        };
        Ok(inner
            .store
            .keys()
            .filter(|k| matches(k))
            .cloned()
            .collect())
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut inner = self.inner.lock();
        if inner.is_live(key) {
            return Ok(false);
        }
        inner.store.insert(
            key.to_string(),
            Entry {
                value: token.as_bytes().to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn extend_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut inner = self.inner.lock();
        let holds = matches!(inner.get_live(key), Some(e) if e.value == token.as_bytes());
        if !holds {
            return Ok(false);
        }
        if let Some(entry) = inner.store.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(true)
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool, KvError> {
        let mut inner = self.inner.lock();
        let holds = matches!(inner.get_live(key), Some(e) if e.value == token.as_bytes());
        if holds {
            inner.store.remove(key);
        }
        Ok(holds)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), KvError> {
        let inner = self.inner.lock();
        if let Some(tx) = inner.channels.get(channel) {
            let _ = tx.send(payload.to_vec());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, KvError> {
        let mut inner = self.inner.lock();
        let tx = inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone();
        Ok(Box::new(FakeSubscription { rx: tx.subscribe() }))
    }
}

struct FakeSubscription {
    rx: broadcast::Receiver<Vec<u8>>,
}

#[async_trait]
impl Subscription for FakeSubscription {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_starts_at_one() {
        let backend = FakeBackend::new();
        assert_eq!(backend.incr("counter").await.expect("incr"), 1);
        assert_eq!(backend.incr("counter").await.expect("incr"), 2);
    }

    #[tokio::test]
    async fn scan_matches_prefix_glob() {
        let backend = FakeBackend::new();
        backend.set("session:a", b"1").await.expect("set");
        backend.set("session:b", b"1").await.expect("set");
        backend.set("other:c", b"1").await.expect("set");
        let mut found = backend.scan("session:*").await.expect("scan");
        found.sort();
        assert_eq!(found, vec!["session:a".to_string(), "session:b".to_string()]);
    }

    #[tokio::test]
    async fn publish_subscribe_round_trips() {
        let backend = FakeBackend::new();
        let mut sub = backend.subscribe("chan").await.expect("subscribe");
        backend.publish("chan", b"hello").await.expect("publish");
        assert_eq!(sub.recv().await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn lock_expires_after_ttl() {
        let backend = FakeBackend::new();
        assert!(backend
            .try_lock("k", "tok", Duration::from_millis(10))
            .await
            .expect("lock"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(backend
            .try_lock("k", "tok2", Duration::from_millis(10))
            .await
            .expect("relock after expiry"));
    }
}
