// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real `Backend` implementation over a Redis (or Redis-compatible) server.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::backend::{Backend, KvError, Subscription};

impl From<redis::RedisError> for KvError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            KvError::Connection(e.to_string())
        } else {
            KvError::Protocol(e.to_string())
        }
    }
}

/// Compare-and-extend the TTL on `key`, but only if its value is `token`.
/// Mirrors the check redis-py's `Lock.extend(replace_ttl=True)` performs.
const EXTEND_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Compare-and-delete `key`, but only if its value is `token`. Mirrors
/// redis-py's `Lock.release()`.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// A `Backend` over a real Redis server, reached via a connection URL of
/// the form `redis://host:port/db` (the `KV_URL` environment variable).
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to `url`, keeping a multiplexed [`ConnectionManager`] that
    /// transparently reconnects across transient network failures.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn append_list(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut found = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            found.extend(keys);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(found)
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let ok: bool = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        Ok(ok)
    }

    async fn extend_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let ret: i64 = redis::Script::new(EXTEND_SCRIPT)
            .key(key)
            .arg(token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(ret == 1)
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let ret: i64 = redis::Script::new(UNLOCK_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(ret == 1)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, KvError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(Box::new(RedisSubscription { pubsub }))
    }
}

struct RedisSubscription {
    pubsub: redis::aio::PubSub,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        let msg = self.pubsub.on_message().next().await?;
        Some(msg.get_payload_bytes().to_vec())
    }
}
