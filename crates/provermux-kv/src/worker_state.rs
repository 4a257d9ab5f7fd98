// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw (non-JSON-quoted) access to per-worker status/generation/
//! monitor_epoch keys, shared by the Arbiter (sole writer of status except
//! for the Session Manager's OK→RESTART_NEEDED transition, sole writer of
//! generation and monitor_epoch) and the Session Manager (reader of all
//! three, writer of status only for that one transition).
//!
//! Grounded in `original_source/inference/arbiter.py`: `redis_client.set(key,
//! PetStatus.OK)` and `redis_client.set(key, 0)` store the bare string/int,
//! never `json.dumps`-wrapped — only pub/sub payloads in that file go
//! through `json.dumps`. This module mirrors that: status is the literal
//! ASCII string, generation and monitor_epoch are the literal decimal
//! digits of the integer.

use provermux_core::WorkerStatus;

use crate::backend::{Backend, KvError};
use crate::keys;

pub async fn get_status<B: Backend + ?Sized>(
    backend: &B,
    pet_idx: usize,
) -> Result<Option<WorkerStatus>, KvError> {
    let key = keys::pet_status_key(pet_idx);
    match backend.get(&key).await? {
        Some(bytes) => {
            let text = String::from_utf8(bytes)
                .map_err(|e| KvError::Protocol(format!("decode {key}: {e}")))?;
            Ok(WorkerStatus::parse(&text))
        }
        None => Ok(None),
    }
}

pub async fn set_status<B: Backend + ?Sized>(
    backend: &B,
    pet_idx: usize,
    status: WorkerStatus,
) -> Result<(), KvError> {
    let key = keys::pet_status_key(pet_idx);
    backend.set(&key, status.as_str().as_bytes()).await
}

pub async fn get_generation<B: Backend + ?Sized>(
    backend: &B,
    pet_idx: usize,
) -> Result<u64, KvError> {
    let key = keys::generation_key(pet_idx);
    match backend.get(&key).await? {
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| KvError::Protocol(format!("decode {key}: not a u64"))),
        None => Ok(0),
    }
}

pub async fn set_generation<B: Backend + ?Sized>(
    backend: &B,
    pet_idx: usize,
    generation: u64,
) -> Result<(), KvError> {
    let key = keys::generation_key(pet_idx);
    backend.set(&key, generation.to_string().as_bytes()).await
}

pub async fn get_monitor_epoch<B: Backend + ?Sized>(
    backend: &B,
    pet_idx: usize,
) -> Result<u64, KvError> {
    let key = keys::monitor_epoch_key(pet_idx);
    match backend.get(&key).await? {
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| KvError::Protocol(format!("decode {key}: not a u64"))),
        None => Ok(0),
    }
}

/// Bump `monitor_epoch[i]` by one, returning the new value — the
/// supervisor loop's per-tick liveness heartbeat.
pub async fn bump_monitor_epoch<B: Backend + ?Sized>(
    backend: &B,
    pet_idx: usize,
) -> Result<u64, KvError> {
    let key = keys::monitor_epoch_key(pet_idx);
    backend.incr(&key).await.map(|v| v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;

    #[tokio::test]
    async fn status_round_trips_as_bare_string() {
        let backend = FakeBackend::new();
        set_status(&backend, 0, WorkerStatus::RestartNeeded)
            .await
            .unwrap();
        let raw = backend.get(&keys::pet_status_key(0)).await.unwrap().unwrap();
        assert_eq!(raw, b"RESTART_NEEDED");
        assert_eq!(
            get_status(&backend, 0).await.unwrap(),
            Some(WorkerStatus::RestartNeeded)
        );
    }

    #[tokio::test]
    async fn generation_defaults_to_zero() {
        let backend = FakeBackend::new();
        assert_eq!(get_generation(&backend, 3).await.unwrap(), 0);
        set_generation(&backend, 3, 5).await.unwrap();
        assert_eq!(get_generation(&backend, 3).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn monitor_epoch_increments_atomically() {
        let backend = FakeBackend::new();
        assert_eq!(bump_monitor_epoch(&backend, 0).await.unwrap(), 1);
        assert_eq!(bump_monitor_epoch(&backend, 0).await.unwrap(), 2);
        assert_eq!(get_monitor_epoch(&backend, 0).await.unwrap(), 2);
    }
}
