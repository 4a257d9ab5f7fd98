// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The opaque worker RPC boundary: a black-box line/socket-oriented
//! protocol this crate never interprets beyond routing and a well-known
//! timeout error code.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// The well-known error code a worker raises on an RPC timeout. Any other
/// non-zero code is a `PROTOCOL_ERROR`.
pub const TIMEOUT_ERROR_CODE: i64 = -33_000;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker rpc timed out")]
    Timeout,
    #[error("worker protocol error (code {code}): {message}")]
    Protocol { code: i64, message: String },
    #[error("worker connection error: {0}")]
    Connection(String),
}

/// A connected client speaking the opaque worker RPC protocol.
///
/// A real implementation ([`crate::TcpLineWorker`]) is a thin pipe to the
/// `pet-server` black box; [`crate::FakeWorker`] (feature `test-support`)
/// lets the replay/restart machinery be tested without one.
#[async_trait]
pub trait WorkerRpc: Send {
    /// Invoke `route` with `params`, bounded by `timeout`.
    async fn call(
        &mut self,
        route: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, WorkerError>;

    /// Close the underlying connection. Called when the Session Manager
    /// notices the worker's generation has moved on.
    async fn close(&mut self);
}
