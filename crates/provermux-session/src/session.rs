// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A client session: an opaque id bound for life to one worker index.
//!
//! Mirrors the Python `Session` dataclass in
//! `original_source/inference/session_model.py`.

use provermux_core::SessionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub pet_idx: usize,
}

impl Session {
    /// Create a new session for a worker already chosen by the caller
    /// (round-robin assignment is the Session Manager's concern, not this
    /// crate's).
    pub fn new(pet_idx: usize) -> Self {
        Self {
            id: SessionId::generate(),
            pet_idx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_a_fresh_id() {
        let a = Session::new(2);
        let b = Session::new(2);
        assert_ne!(a.id, b.id);
        assert_eq!(a.pet_idx, 2);
    }

    #[test]
    fn round_trips_through_json() {
        let s = Session::new(3);
        let raw = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.id, s.id);
        assert_eq!(back.pet_idx, 3);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_trips_through_json(pet_idx in any::<usize>()) {
                let s = Session::new(pet_idx);
                let raw = serde_json::to_string(&s).unwrap();
                let back: Session = serde_json::from_str(&raw).unwrap();
                prop_assert_eq!(back.id, s.id);
                prop_assert_eq!(back.pet_idx, s.pet_idx);
            }
        }
    }
}
