// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `old_state_key -> fresh State`, populated during replay so the *next*
//! request can rewrite stale parameters without replaying again.
//!
//! Mirrors the Python `MappingState` dataclass in
//! `original_source/inference/session_model.py`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::State;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingState {
    pub mapping: HashMap<String, State>,
}

impl MappingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, old_state_key: &str) -> Option<&State> {
        self.mapping.get(old_state_key)
    }

    pub fn contains(&self, old_state_key: &str) -> bool {
        self.mapping.contains_key(old_state_key)
    }

    pub fn add(&mut self, old_state_key: impl Into<String>, new_state: State) {
        self.mapping.insert(old_state_key.into(), new_state);
    }

    /// Whether `old_state_key` already has an image current as of
    /// `generation` — the replay walk's per-node skip condition.
    pub fn has_current_image(&self, old_state_key: &str, generation: u64) -> bool {
        self.get(old_state_key)
            .is_some_and(|s| s.generation == generation)
    }
}
