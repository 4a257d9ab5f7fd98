// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arbiter-specific errors: configuration and startup failures that are
//! fatal (unlike per-tick supervision failures, which are logged and
//! retried rather than propagated).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("missing or invalid environment variable {0}")]
    Config(String),
    #[error("kv store error: {0}")]
    Kv(#[from] provermux_kv::KvError),
    #[error("failed to spawn worker {pet_idx}: {source}")]
    Spawn {
        pet_idx: usize,
        #[source]
        source: provermux_worker::WorkerHandleError,
    },
    #[error("signal handler setup failed: {0}")]
    Signal(#[from] std::io::Error),
}
