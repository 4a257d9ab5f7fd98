// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One cached worker connection per worker index, reopened whenever its
//! generation falls behind.
//!
//! Grounded on `SessionManager._get_worker` in
//! `original_source/inference/sessions.py`, which keeps one `Pytanque`
//! client per `pet_idx` and recreates it when `worker_generations[pet_idx]`
//! no longer matches the freshly-read generation. Each slot is its own
//! `tokio::sync::Mutex` rather than one lock over the whole table, so
//! refreshing worker `i`'s connection never blocks a concurrent call on
//! worker `j` (the KV `pet_lock:i` is what actually serializes callers of
//! the same worker; this is just in-process bookkeeping on top of it).

use std::sync::Arc;

use provermux_core::CoreError;
use provermux_worker::{WorkerError, WorkerRpc};
use tokio::sync::Mutex;

/// Map the opaque worker RPC boundary's error type onto the stable
/// taxonomy: a timeout stays a timeout, a structured protocol error stays
/// a protocol error, and a dead connection is internal (it indicates this
/// process's own bookkeeping is wrong, since the Arbiter's liveness probe
/// already vouched for the worker).
pub fn map_worker_error(e: WorkerError) -> CoreError {
    match e {
        WorkerError::Timeout => CoreError::Timeout("worker rpc timed out".to_string()),
        WorkerError::Protocol { code, message } => {
            CoreError::ProtocolError(format!("code {code}: {message}"))
        }
        WorkerError::Connection(msg) => CoreError::Internal(format!("worker connection: {msg}")),
    }
}

/// A worker connection plus the generation it was opened under.
pub struct CachedConnection {
    pub generation: u64,
    pub worker: Box<dyn WorkerRpc>,
}

/// Produces a fresh [`WorkerRpc`] connection for a given worker index.
///
/// [`crate::TcpWorkerFactory`] dials the real subprocess;
/// `test-support` builds use a factory closing over pre-built
/// [`provermux_worker::FakeWorker`] instances so a "restart" can be
/// simulated with `FakeWorker::reset` without tearing down the pool.
pub trait WorkerFactory: Send + Sync + 'static {
    fn connect(&self, pet_idx: usize) -> Box<dyn WorkerRpc>;
}

/// Dials the real `pet-server` subprocess pool over TCP, one port per
/// worker index (`base_port + pet_idx`), mirroring `_get_worker`'s
/// `Pytanque(port=...)` construction in
/// `original_source/inference/sessions.py`.
pub struct TcpWorkerFactory {
    base_port: u16,
}

impl TcpWorkerFactory {
    pub fn new(base_port: u16) -> Self {
        Self { base_port }
    }
}

impl WorkerFactory for TcpWorkerFactory {
    fn connect(&self, pet_idx: usize) -> Box<dyn WorkerRpc> {
        let port = self.base_port + pet_idx as u16;
        Box::new(provermux_worker::TcpLineWorker::new(port))
    }
}

/// One connection slot per worker index.
pub struct ConnectionPool {
    slots: Vec<Mutex<Option<CachedConnection>>>,
    factory: Arc<dyn WorkerFactory>,
}

impl ConnectionPool {
    pub fn new(num_pet_server: usize, factory: Arc<dyn WorkerFactory>) -> Self {
        let slots = (0..num_pet_server).map(|_| Mutex::new(None)).collect();
        Self { slots, factory }
    }

    /// The connection slot for `pet_idx`, to be locked by the caller for
    /// the duration of an RPC (or a replay step's RPC).
    pub fn slot(&self, pet_idx: usize) -> &Mutex<Option<CachedConnection>> {
        &self.slots[pet_idx]
    }

    /// Ensure the slot for `pet_idx` holds a connection tagged with
    /// `current_generation`, closing and reopening it otherwise.
    pub async fn ensure_fresh(&self, pet_idx: usize, current_generation: u64) {
        let mut guard = self.slots[pet_idx].lock().await;
        let stale = match &*guard {
            Some(c) => c.generation != current_generation,
            None => true,
        };
        if !stale {
            return;
        }
        if let Some(mut old) = guard.take() {
            old.worker.close().await;
        }
        *guard = Some(CachedConnection {
            generation: current_generation,
            worker: self.factory.connect(pet_idx),
        });
    }
}
