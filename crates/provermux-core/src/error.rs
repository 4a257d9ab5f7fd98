// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error taxonomy shared by the Arbiter and the Session Manager.

use thiserror::Error;

/// The six stable labels every call-path error is surfaced under.
///
/// These map directly onto the taxonomy the Session Manager's public
/// contract promises: a label plus a free-form message, never a raw
/// downstream error type leaking across the RPC boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown session id or missing key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lock acquisition timed out.
    #[error("busy: {0}")]
    Busy(String),

    /// Worker not OK within `timeout_ok`, or arbiter unresponsive.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Worker RPC exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Worker replied with a structured protocol error (not a crash).
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error must flip the owning worker's status to
    /// `RESTART_NEEDED` before being surfaced.
    pub fn require_restart(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Internal(_))
    }

    /// Short machine-stable label, independent of the free-form message —
    /// useful for metrics and for tests that assert on error *kind* only.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Busy(_) => "BUSY",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }
}
