// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker status, as observed through the KV store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable lifecycle state of one worker index.
///
/// Serializes to the bit-exact strings the wire schema requires:
/// `OK`, `RESTART_NEEDED`, `RESTARTING`, `DOWN`. All transitions belong to
/// the Arbiter except `Ok -> RestartNeeded`, which the Session Manager may
/// also perform when a worker RPC fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "RESTART_NEEDED")]
    RestartNeeded,
    #[serde(rename = "RESTARTING")]
    Restarting,
    #[serde(rename = "DOWN")]
    Down,
}

impl WorkerStatus {
    /// Parse the bit-exact wire string, returning `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(Self::Ok),
            "RESTART_NEEDED" => Some(Self::RestartNeeded),
            "RESTARTING" => Some(Self::Restarting),
            "DOWN" => Some(Self::Down),
            _ => None,
        }
    }

    /// The bit-exact wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::RestartNeeded => "RESTART_NEEDED",
            Self::Restarting => "RESTARTING",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_strings() {
        for status in [
            WorkerStatus::Ok,
            WorkerStatus::RestartNeeded,
            WorkerStatus::Restarting,
            WorkerStatus::Down,
        ] {
            assert_eq!(WorkerStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn rejects_unknown_strings() {
        assert_eq!(WorkerStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn json_round_trip_is_bit_exact() {
        let json = serde_json::to_string(&WorkerStatus::RestartNeeded).expect("serialize");
        assert_eq!(json, "\"RESTART_NEEDED\"");
    }
}
