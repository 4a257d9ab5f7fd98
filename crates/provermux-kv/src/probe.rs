// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request/reply envelope used on the Arbiter's probe channel.
//!
//! A probe round-trip forces the caller to wait for one complete
//! supervisor iteration on a worker before proceeding — the correct
//! synchronization point, since a bare status flag read can race an
//! in-progress restart.

use serde::{Deserialize, Serialize};

/// A probe request published on `arbiter:req:<i>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub id: String,
    pub reply_to: String,
}

/// The Arbiter's reply, published on the request's `reply_to` channel once
/// one full supervisor tick for that worker has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReply {
    pub id: String,
    pub resp: String,
}

impl ProbeReply {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resp: "OK".to_string(),
        }
    }
}
