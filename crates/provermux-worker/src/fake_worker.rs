// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-process fake worker that drives the replay/restart test suite
//! deterministically (feature `test-support`, mirrors `oj-adapters`'s
//! `FakeAdapter` pattern).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::rpc::{WorkerError, WorkerRpc};

/// Shared state behind a [`FakeWorker`], so a test can restart "the
/// worker" (clear state, bump a counter) while every `FakeWorker` handle
/// held by the Session Manager keeps working against the same identity.
#[derive(Default)]
struct Inner {
    /// state_key -> the tactic-applied "document" string it represents.
    states: Mutex<HashMap<String, String>>,
    next_state: AtomicU64,
    /// route names that should fail with the well-known timeout code on
    /// their next invocation.
    force_timeout: Mutex<Vec<String>>,
}

/// A deterministic stand-in for a `pet-server` subprocess.
///
/// Supports the route table's routes with toy semantics:
/// `get_state_at_pos`/`get_root_state`/`start` mint a fresh state;
/// `run` appends its tactic text to the parent state's document and mints
/// a new state; query-only routes read a state without changing it.
#[derive(Clone)]
pub struct FakeWorker {
    inner: Arc<Inner>,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Simulate a restart: every state minted before this point becomes
    /// unreachable, exactly as it would be on a fresh `pet-server` process.
    pub fn reset(&self) {
        self.inner.states.lock().clear();
    }

    /// Force the next call to `route` to fail with the well-known timeout
    /// error code, simulating a hung tactic.
    pub fn force_timeout_on(&self, route: &str) {
        self.inner.force_timeout.lock().push(route.to_string());
    }

    fn mint_state(&self, doc: String) -> String {
        let n = self.inner.next_state.fetch_add(1, Ordering::SeqCst);
        let key = format!("state-{n}");
        self.inner.states.lock().insert(key.clone(), doc);
        key
    }
}

#[async_trait]
impl WorkerRpc for FakeWorker {
    async fn call(
        &mut self,
        route: &str,
        params: Value,
        _timeout: Duration,
    ) -> Result<Value, WorkerError> {
        {
            let mut forced = self.inner.force_timeout.lock();
            if let Some(pos) = forced.iter().position(|r| r == route) {
                forced.remove(pos);
                return Err(WorkerError::Timeout);
            }
        }

        match route {
            "get_state_at_pos" | "get_root_state" | "start" => {
                let doc = params
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or("<root>")
                    .to_string();
                let key = self.mint_state(doc);
                Ok(json!({ "st": key }))
            }
            "run" => {
                let parent_key = extract_state_field(&params, "state")?;
                let tactic = params.get("tactic").and_then(Value::as_str).unwrap_or("");
                let parent_doc = self
                    .inner
                    .states
                    .lock()
                    .get(&parent_key)
                    .cloned()
                    .ok_or_else(|| WorkerError::Protocol {
                        code: -1,
                        message: format!("unknown state {parent_key}"),
                    })?;
                let new_doc = format!("{parent_doc}{tactic}");
                let key = self.mint_state(new_doc);
                Ok(json!({ "st": key }))
            }
            "goals" | "ast" | "complete_goals" | "premises" | "state_hash"
            | "list_notations_in_statement" => {
                let parent_key = extract_state_field(&params, "state")?;
                let doc = self
                    .inner
                    .states
                    .lock()
                    .get(&parent_key)
                    .cloned()
                    .ok_or_else(|| WorkerError::Protocol {
                        code: -1,
                        message: format!("unknown state {parent_key}"),
                    })?;
                Ok(json!({ "goals": doc }))
            }
            "state_equal" => Ok(json!({ "equal": true })),
            "toc" | "ast_at_pos" => Ok(json!({ "ok": true })),
            other => Err(WorkerError::Protocol {
                code: -2,
                message: format!("unknown route {other}"),
            }),
        }
    }

    async fn close(&mut self) {}
}

fn extract_state_field(params: &Value, field: &str) -> Result<String, WorkerError> {
    params
        .get(field)
        .and_then(|s| s.get("st"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| WorkerError::Protocol {
            code: -3,
            message: format!("missing state field {field}"),
        })
}

impl Default for FakeWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_chains_onto_parent_state() {
        let mut worker = FakeWorker::new();
        let root = worker
            .call(
                "get_state_at_pos",
                json!({ "path": "Foo.v" }),
                Duration::from_secs(1),
            )
            .await
            .expect("root");
        let s1 = worker
            .call(
                "run",
                json!({ "state": root, "tactic": "intro." }),
                Duration::from_secs(1),
            )
            .await
            .expect("run");
        let goals = worker
            .call("goals", json!({ "state": s1 }), Duration::from_secs(1))
            .await
            .expect("goals");
        assert_eq!(goals["goals"], json!("Foo.vintro."));
    }

    #[tokio::test]
    async fn reset_invalidates_previously_minted_states() {
        let mut worker = FakeWorker::new();
        let root = worker
            .call(
                "get_state_at_pos",
                json!({ "path": "Foo.v" }),
                Duration::from_secs(1),
            )
            .await
            .expect("root");
        worker.reset();
        let err = worker
            .call("goals", json!({ "state": root }), Duration::from_secs(1))
            .await
            .expect_err("state should be gone after reset");
        assert!(matches!(err, WorkerError::Protocol { .. }));
    }

    #[tokio::test]
    async fn forced_timeout_fires_once() {
        let mut worker = FakeWorker::new();
        worker.force_timeout_on("run");
        let root = worker
            .call(
                "get_state_at_pos",
                json!({ "path": "Foo.v" }),
                Duration::from_secs(1),
            )
            .await
            .expect("root");
        let err = worker
            .call(
                "run",
                json!({ "state": root, "tactic": "intro." }),
                Duration::from_secs(1),
            )
            .await
            .expect_err("forced timeout");
        assert!(matches!(err, WorkerError::Timeout));

        // Second call is not forced anymore.
        worker
            .call(
                "run",
                json!({ "state": root, "tactic": "intro." }),
                Duration::from_secs(1),
            )
            .await
            .expect("second run succeeds");
    }
}
