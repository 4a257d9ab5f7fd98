// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `state_key -> tree_id`, indexing the roots of every disjoint ParamsTree
//! a session owns.
//!
//! Mirrors the Python `MappingTree` dataclass in
//! `original_source/inference/session_model.py`.

use std::collections::HashMap;

use provermux_core::TreeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingTree {
    pub mapping: HashMap<String, TreeId>,
}

impl MappingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, state_key: &str) -> Option<&TreeId> {
        self.mapping.get(state_key)
    }

    pub fn contains(&self, state_key: &str) -> bool {
        self.mapping.contains_key(state_key)
    }

    pub fn add(&mut self, state_key: impl Into<String>, tree_id: TreeId) {
        self.mapping.insert(state_key.into(), tree_id);
    }
}
