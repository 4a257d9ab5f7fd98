// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON (de)serialization helpers layered over [`crate::Backend`].
//!
//! Mirrors the Python `RedisSessionSerializable`/`RedisIDSerializable`
//! mixins from `original_source/inference/session_model.py`: every
//! persisted record is `to_json`/`from_json`, stored as one UTF-8 JSON
//! value per key.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::{Backend, KvError};

/// Typed JSON get/set convenience built on top of a raw [`Backend`].
#[async_trait::async_trait]
pub trait KvSerde: Backend {
    /// Load and JSON-decode the value at `key`, if present.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        match self.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| KvError::Protocol(format!("decode {key}: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// JSON-encode and store `value` at `key`.
    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), KvError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| KvError::Protocol(format!("encode {key}: {e}")))?;
        self.set(key, &bytes).await
    }

    /// JSON-encode and append `value` to the list at `key`.
    async fn append_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), KvError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| KvError::Protocol(format!("encode {key}: {e}")))?;
        self.append_list(key, &bytes).await
    }

    /// Load and JSON-decode every element previously written to `key` via
    /// [`Self::append_json`]. Each element is stored as its own encoded
    /// byte string, so this decodes the outer array of byte arrays, then
    /// each element independently.
    async fn get_json_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, KvError> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(Vec::new());
        };
        let raw: Vec<Vec<u8>> = serde_json::from_slice(&bytes)
            .map_err(|e| KvError::Protocol(format!("decode {key}: {e}")))?;
        raw.into_iter()
            .map(|item| {
                serde_json::from_slice(&item)
                    .map_err(|e| KvError::Protocol(format!("decode {key} element: {e}")))
            })
            .collect()
    }
}

impl<B: Backend + ?Sized> KvSerde for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        n: u32,
    }

    #[tokio::test]
    async fn get_json_round_trips_a_single_value() {
        let backend = FakeBackend::new();
        backend.set_json("k", &Item { n: 7 }).await.unwrap();
        let back: Item = backend.get_json("k").await.unwrap().unwrap();
        assert_eq!(back, Item { n: 7 });
    }

    #[tokio::test]
    async fn get_json_list_decodes_appended_elements() {
        let backend = FakeBackend::new();
        backend.append_json("list", &Item { n: 1 }).await.unwrap();
        backend.append_json("list", &Item { n: 2 }).await.unwrap();
        let items: Vec<Item> = backend.get_json_list("list").await.unwrap();
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
    }

    #[tokio::test]
    async fn get_json_list_is_empty_when_key_absent() {
        let backend = FakeBackend::new();
        let items: Vec<Item> = backend.get_json_list("missing").await.unwrap();
        assert!(items.is_empty());
    }
}
