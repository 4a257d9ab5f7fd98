// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The exact RPC that produced a ParamsTree node, recorded verbatim so
//! replay re-derives the original call rather than a rewritten one.
//!
//! Mirrors the Python `QueryKwargs` dataclass in
//! `original_source/inference/session_model.py`; `params` stays an opaque
//! JSON value here rather than a typed-per-route params class, since this
//! crate never interprets route payloads.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded worker RPC: the route, the caller's original (pre-rewrite)
/// parameters, and the timeout that was in effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryKwargs {
    pub route_name: String,
    pub params: Value,
    pub timeout: Option<f64>,
}

impl QueryKwargs {
    pub fn new(route_name: impl Into<String>, params: Value, timeout: Option<Duration>) -> Self {
        Self {
            route_name: route_name.into(),
            params,
            timeout: timeout.map(|d| d.as_secs_f64()),
        }
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs_f64)
    }
}
