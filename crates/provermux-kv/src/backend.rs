// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The KV store operations every other component relies on (C1).
//!
//! [`Backend`] is intentionally narrow: atomic increment, get/set,
//! compare-and-delete/extend for TTL locks, pub/sub publish, key scanning.
//! [`crate::RedisBackend`] implements it over a real Redis connection;
//! [`crate::FakeBackend`] (behind `test-support`) implements it in-memory so
//! replay and restart logic can be unit-tested without a running Redis.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a [`Backend`] implementation.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv connection error: {0}")]
    Connection(String),
    #[error("kv protocol error: {0}")]
    Protocol(String),
}

/// A subscription to a pub/sub channel, yielding raw UTF-8 JSON payloads.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message, or `None` if the channel was closed.
    async fn recv(&mut self) -> Option<Vec<u8>>;
}

/// Thin wrapper over an external in-memory key-value store (C1).
///
/// All values are UTF-8 JSON; this trait deals in raw bytes and leaves
/// (de)serialization to callers via [`crate::KvSerde`].
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// `GET key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// `SET key value`.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// `DEL key`.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// `INCR key`, returning the post-increment value.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// `RPUSH key value` — append to an append-only list.
    async fn append_list(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// `SCAN` every key matching a `*`-suffixed or `*`-only glob pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Atomically set `key = token` with expiry `ttl`, only if `key` does
    /// not already exist. Returns whether the lock was acquired.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Atomically extend `key`'s expiry to `ttl`, only if its current value
    /// equals `token`. Returns whether the extension took effect.
    async fn extend_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Atomically delete `key`, only if its current value equals `token`.
    /// Returns whether the key was deleted (a `false` here — because the
    /// TTL already expired and evicted the key — is not an error; the lock
    /// is effectively released either way).
    async fn unlock(&self, key: &str, token: &str) -> Result<bool, KvError>;

    /// Publish a raw payload on a pub/sub channel.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), KvError>;

    /// Subscribe to a pub/sub channel.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, KvError>;
}
