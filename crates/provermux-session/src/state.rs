// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A worker-returned state handle, tagged with the generation under which
//! it was produced.
//!
//! Grounded on `state_to_state_key` and the `State` client type in
//! `original_source/inference/session_model.py`: a worker only ever hands
//! back an opaque handle (`st`); the Session Manager is what stamps it
//! with a generation so staleness can later be detected without asking
//! the worker.

use serde::{Deserialize, Serialize};

/// An opaque worker-side state handle plus the generation it was produced
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Opaque handle as returned by the worker (never interpreted).
    pub st: String,
    /// Worker generation observed at the moment this handle was minted.
    pub generation: u64,
}

impl State {
    pub fn new(st: impl Into<String>, generation: u64) -> Self {
        Self {
            st: st.into(),
            generation,
        }
    }

    /// Content identifier used to index ParamsTree nodes and MappingState/
    /// MappingTree entries (`"<generation>:<handle>"`).
    pub fn state_key(&self) -> String {
        format!("{}:{}", self.generation, self.st)
    }

    /// Whether this handle was minted under the generation currently
    /// running for its worker — the fast path of the state refresh
    /// protocol.
    pub fn is_current(&self, current_generation: u64) -> bool {
        self.generation == current_generation
    }
}
