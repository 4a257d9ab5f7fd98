// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Session Manager façade: session assignment, the mutual-exclusion/
//! staleness/replay/caching protocol around every worker RPC, and
//! read-only fleet status.
//!
//! Grounded throughout on `SessionManager` in
//! `original_source/inference/sessions.py` — `create_session` mirrors its
//! round-robin `pet_idx` assignment over `session_assigned_idx_key`;
//! `call` mirrors `_pet_call`/`_pet_ctx` end to end (acquire lock, probe,
//! reload, refresh connection, replay-rewrite params, extend lock,
//! invoke, record history, release); `status` mirrors `pet_status`.

use std::sync::Arc;
use std::time::Duration;

use provermux_core::{CoreError, SessionId, TreeId};
use provermux_kv::{keys, Backend, KvError, KvLock, ProbeReply, ProbeRequest};
use provermux_session::{store, MappingState, MappingTree, ParamsTree, QueryKwargs, Session};
use provermux_worker::{route_kind, RouteKind};
use serde_json::Value;
use tracing::warn;

use crate::cache::Caches;
use crate::config::Config;
use crate::connections::{map_worker_error, ConnectionPool, WorkerFactory};
use crate::replay::{find_parent_state, rewrite_params, tag_worker_state, ReplayCtx};

fn kv_err(e: KvError) -> CoreError {
    match e {
        KvError::Connection(msg) => CoreError::Unavailable(msg),
        KvError::Protocol(msg) => CoreError::Internal(msg),
    }
}

/// The Session Manager: the per-request engine sitting in front of the
/// worker pool. Cheaply `Clone`-able via `Arc` by the (out-of-scope) HTTP
/// layer, since every field is interior-mutable or shared.
pub struct SessionManager<B: Backend + ?Sized> {
    config: Config,
    backend: Arc<B>,
    caches: Caches,
    pool: ConnectionPool,
}

impl<B: Backend + ?Sized> SessionManager<B> {
    pub fn new(config: Config, backend: Arc<B>, factory: Arc<dyn WorkerFactory>) -> Self {
        let pool = ConnectionPool::new(config.num_pet_server, factory);
        Self {
            config,
            backend,
            caches: Caches::new(),
            pool,
        }
    }

    /// Create a new session, round-robin assigning it to a worker.
    pub async fn create_session(&self) -> Result<SessionId, CoreError> {
        let counter = self
            .backend
            .incr(keys::session_assigned_idx_key())
            .await
            .map_err(kv_err)?;
        let pet_idx = (counter.rem_euclid(self.config.num_pet_server as i64)) as usize;

        let session = Session::new(pet_idx);
        self.caches.put_session(&*self.backend, &session).await?;
        self.caches
            .put_mapping_state(&*self.backend, &session.id, &MappingState::new())
            .await?;
        self.caches
            .put_mapping_tree(&*self.backend, &session.id, &MappingTree::new())
            .await?;
        Ok(session.id)
    }

    /// Fleet status: `true` iff every worker reports `OK`.
    pub async fn status(&self) -> Result<bool, CoreError> {
        for pet_idx in 0..self.config.num_pet_server {
            let status = provermux_kv::get_status(&*self.backend, pet_idx)
                .await
                .map_err(kv_err)?;
            if status != Some(provermux_core::WorkerStatus::Ok) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Invoke `route_name` against `session_id`'s worker with `params`,
    /// implementing the full call protocol: acquire lock, probe, reload,
    /// refresh connection, replay-rewrite params, extend lock, invoke,
    /// record history, release.
    pub async fn call(
        &self,
        session_id: &SessionId,
        route_name: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, CoreError> {
        let session = self.caches.session(&*self.backend, session_id).await?;
        let effective_timeout = timeout.unwrap_or(self.config.default_call_timeout);
        if effective_timeout.is_zero() {
            return Err(CoreError::ProtocolError(
                "call timeout must be positive".to_string(),
            ));
        }

        // Step 1: acquire the worker's mutual-exclusion lock.
        let lock_key = keys::pet_lock_key(session.pet_idx);
        let lock = KvLock::acquire(
            self.backend.clone(),
            lock_key,
            self.config.acquire_ttl(),
            self.config.acquire_ttl(),
        )
        .await
        .map_err(|e| match e {
            KvError::Protocol(msg) => CoreError::Busy(msg),
            KvError::Connection(msg) => CoreError::Unavailable(msg),
        })?;

        let result = self
            .call_locked(&session, route_name, params, effective_timeout, &lock)
            .await;

        lock.release().await;
        result
    }

    async fn call_locked(
        &self,
        session: &Session,
        route_name: &str,
        params: Value,
        timeout: Duration,
        lock: &KvLock<B>,
    ) -> Result<Value, CoreError> {
        let pet_idx = session.pet_idx;

        // Step 2: probe the Arbiter, forcing a synchronization point with
        // its supervisor loop before touching the worker.
        if let Err(e) = self.probe(pet_idx).await {
            let _ = provermux_kv::set_status(
                &*self.backend,
                pet_idx,
                provermux_core::WorkerStatus::RestartNeeded,
            )
            .await;
            return Err(e);
        }

        // Step 3: reload the session (rare-race protection: a concurrent
        // archival or reassignment between the initial lookup and here).
        let session = self
            .caches
            .reload_session(&*self.backend, &session.id)
            .await?;

        // Step 4: read the worker's current generation and make sure our
        // connection matches it.
        let current_generation = provermux_kv::get_generation(&*self.backend, pet_idx)
            .await
            .map_err(kv_err)?;
        self.pool.ensure_fresh(pet_idx, current_generation).await;

        // Step 5: replay/rewrite any stale state handle in `params`. The
        // recorded history is kept on a clone; `params` itself stays
        // pristine for ParamsTree bookkeeping below.
        let mapping_state = self
            .caches
            .mapping_state(&*self.backend, &session.id)
            .await?;
        let mut rewritten_params = params.clone();
        {
            let ctx = ReplayCtx::new(
                &*self.backend,
                &self.caches,
                &session.id,
                pet_idx,
                current_generation,
                &self.pool,
                self.config.default_call_timeout,
                mapping_state,
            );
            rewrite_params(&ctx, &mut rewritten_params).await?;
            let mapping_state = ctx.into_mapping_state().await;
            self.caches
                .put_mapping_state(&*self.backend, &session.id, &mapping_state)
                .await?;
        }

        // Step 6: extend the lock so it cannot expire mid-RPC.
        lock.extend(timeout + self.config.timeout_eps)
            .await
            .map_err(|e| CoreError::Internal(format!("extend worker lock: {e}")))?;

        // Step 7: invoke the worker.
        let kind = route_kind(route_name);
        let response = {
            let mut slot = self.pool.slot(pet_idx).lock().await;
            let conn = slot.as_mut().ok_or_else(|| {
                CoreError::Internal(format!("no connection cached for worker {pet_idx}"))
            })?;
            conn.worker
                .call(route_name, rewritten_params, timeout)
                .await
        };
        let response = match response {
            Ok(v) => v,
            Err(e) => {
                let err = map_worker_error(e);
                if err.require_restart() {
                    let _ = provermux_kv::set_status(
                        &*self.backend,
                        pet_idx,
                        provermux_core::WorkerStatus::RestartNeeded,
                    )
                    .await;
                }
                return Err(err);
            }
        };

        // Step 8: on success, record history (if this route produces
        // state) and return. The response handed back to the caller is
        // the client-facing tagged state, not the worker's bare handle —
        // workers are generation-unaware, so this is the only place that
        // stamps one.
        if kind.produces_state() {
            let new_state = self
                .record_tree(
                    &session,
                    route_name,
                    &params,
                    &response,
                    current_generation,
                    timeout,
                    kind,
                )
                .await?;
            let tagged = serde_json::to_value(new_state)
                .map_err(|e| CoreError::Internal(format!("encode tagged state: {e}")))?;
            return Ok(tagged);
        }

        Ok(response)
    }

    /// Append a ParamsTree node for a state-producing call and update the
    /// session's MappingTree index, using the caller's original
    /// (pre-rewrite) `params` — the tree records the call as the client
    /// issued it, not as it was replayed against a particular generation.
    async fn record_tree(
        &self,
        session: &Session,
        route_name: &str,
        original_params: &Value,
        response: &Value,
        generation: u64,
        timeout: Duration,
        kind: RouteKind,
    ) -> Result<provermux_session::State, CoreError> {
        let new_state = tag_worker_state(response, generation).ok_or_else(|| {
            CoreError::Internal(format!(
                "route {route_name} is expected to produce a state but did not"
            ))
        })?;
        let node = ParamsTree::new(
            new_state.state_key(),
            QueryKwargs::new(route_name, original_params.clone(), Some(timeout)),
        );

        if kind.is_initial_session() {
            let tree_id = TreeId::generate();
            self.caches
                .put_params_tree(&*self.backend, &session.id, &tree_id, &node)
                .await?;
            let mut mapping_tree = self.caches.mapping_tree(&*self.backend, &session.id).await?;
            mapping_tree.add(new_state.state_key(), tree_id);
            self.caches
                .put_mapping_tree(&*self.backend, &session.id, &mapping_tree)
                .await?;
            return Ok(new_state);
        }

        let (_, parent) = find_parent_state(original_params).ok_or_else(|| {
            CoreError::ProtocolError(format!(
                "route {route_name} produces state but params carried no parent state"
            ))
        })?;
        let parent_key = parent.state_key();

        let mut mapping_tree = self.caches.mapping_tree(&*self.backend, &session.id).await?;
        let tree_id = match mapping_tree.get(&parent_key) {
            Some(id) => id.clone(),
            None => {
                mapping_tree = self
                    .caches
                    .reload_mapping_tree(&*self.backend, &session.id)
                    .await?;
                mapping_tree.get(&parent_key).cloned().ok_or_else(|| {
                    CoreError::Internal(format!("no tree indexes parent state {parent_key}"))
                })?
            }
        };

        let mut tree = self
            .caches
            .params_tree(&*self.backend, &session.id, &tree_id)
            .await?;
        tree.add_child_at(&parent_key, node)?;
        self.caches
            .put_params_tree(&*self.backend, &session.id, &tree_id, &tree)
            .await?;

        mapping_tree.add(new_state.state_key(), tree_id);
        self.caches
            .put_mapping_tree(&*self.backend, &session.id, &mapping_tree)
            .await?;
        Ok(new_state)
    }

    /// Step 2 of `call`: round-trip a probe through the Arbiter's
    /// supervisor loop for `pet_idx`, via a private reply channel.
    async fn probe(&self, pet_idx: usize) -> Result<(), CoreError> {
        let req_id = uuid::Uuid::new_v4().simple().to_string();
        let reply_to = format!("arbiter:reply:{pet_idx}:{req_id}");

        let mut sub = self.backend.subscribe(&reply_to).await.map_err(kv_err)?;

        let request = ProbeRequest {
            id: req_id,
            reply_to: reply_to.clone(),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| CoreError::Internal(format!("encode probe request: {e}")))?;
        self.backend
            .publish(&keys::arbiter_req_channel(pet_idx), &payload)
            .await
            .map_err(kv_err)?;

        match tokio::time::timeout(self.config.timeout_ok, sub.recv()).await {
            Ok(Some(bytes)) => {
                let _reply: ProbeReply = serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Internal(format!("decode probe reply: {e}")))?;
                Ok(())
            }
            Ok(None) => Err(CoreError::Unavailable(format!(
                "probe channel for worker {pet_idx} closed before a reply arrived"
            ))),
            Err(_) => {
                warn!(pet_idx, "probe timed out, marking worker for restart");
                Err(CoreError::Unavailable(format!(
                    "worker {pet_idx} did not respond to probe within timeout"
                )))
            }
        }
    }

    /// Administrative archival, never called from `call`.
    pub async fn archive_session(&self, session_id: &SessionId) -> Result<(), CoreError> {
        store::archive_session(&*self.backend, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provermux_kv::FakeBackend;
    use provermux_worker::FakeWorker;
    use serde_json::json;
    use std::collections::HashMap;

    struct FakeFactory {
        workers: HashMap<usize, FakeWorker>,
    }

    impl FakeFactory {
        fn new(n: usize) -> (Self, Vec<FakeWorker>) {
            let workers: Vec<FakeWorker> = (0..n).map(|_| FakeWorker::new()).collect();
            let map = workers
                .iter()
                .enumerate()
                .map(|(i, w)| (i, w.clone()))
                .collect();
            (Self { workers: map }, workers)
        }
    }

    impl WorkerFactory for FakeFactory {
        fn connect(&self, pet_idx: usize) -> Box<dyn provermux_worker::WorkerRpc> {
            Box::new(self.workers[&pet_idx].clone())
        }
    }

    async fn test_manager(n: usize) -> (SessionManager<FakeBackend>, Vec<FakeWorker>) {
        let backend = Arc::new(FakeBackend::new());
        for i in 0..n {
            provermux_kv::set_status(&*backend, i, provermux_core::WorkerStatus::Ok)
                .await
                .unwrap();
            provermux_kv::set_generation(&*backend, i, 0).await.unwrap();
        }
        // Auto-ack every probe so `call` never blocks on a real Arbiter.
        for i in 0..n {
            let backend = backend.clone();
            tokio::spawn(async move {
                let channel = keys::arbiter_req_channel(i);
                let mut sub = backend.subscribe(&channel).await.unwrap();
                while let Some(payload) = sub.recv().await {
                    let req: ProbeRequest = serde_json::from_slice(&payload).unwrap();
                    let reply = ProbeReply::ok(req.id);
                    let bytes = serde_json::to_vec(&reply).unwrap();
                    let _ = backend.publish(&req.reply_to, &bytes).await;
                }
            });
        }
        tokio::task::yield_now().await;

        let (factory, workers) = FakeFactory::new(n);
        let config = Config {
            num_pet_server: n,
            base_port: 0,
            kv_url: String::new(),
            timeout_ok: Duration::from_secs(1),
            timeout_eps: Duration::from_secs(1),
            default_call_timeout: Duration::from_secs(5),
        };
        let manager = SessionManager::new(config, backend, Arc::new(factory));
        (manager, workers)
    }

    #[tokio::test]
    async fn two_sessions_on_the_same_worker_keep_independent_histories() {
        let (manager, _workers) = test_manager(1).await;
        let s1 = manager.create_session().await.unwrap();
        let s2 = manager.create_session().await.unwrap();

        let root1 = manager
            .call(&s1, "get_root_state", json!({"path": "A.v"}), None)
            .await
            .unwrap();
        let root2 = manager
            .call(&s2, "get_root_state", json!({"path": "B.v"}), None)
            .await
            .unwrap();

        let leaf1 = manager
            .call(
                &s1,
                "run",
                json!({"state": root1, "tactic": "intro."}),
                None,
            )
            .await
            .unwrap();
        let goals1 = manager
            .call(&s1, "goals", json!({"state": leaf1}), None)
            .await
            .unwrap();
        let goals2 = manager
            .call(&s2, "goals", json!({"state": root2}), None)
            .await
            .unwrap();

        assert_eq!(goals1["goals"], json!("A.vintro."));
        assert_eq!(goals2["goals"], json!("B.v"));
    }

    #[tokio::test]
    async fn state_survives_a_worker_restart_via_replay() {
        let (manager, workers) = test_manager(1).await;
        let session = manager.create_session().await.unwrap();

        let root = manager
            .call(&session, "get_root_state", json!({"path": "A.v"}), None)
            .await
            .unwrap();
        let leaf = manager
            .call(
                &session,
                "run",
                json!({"state": root, "tactic": "intro."}),
                None,
            )
            .await
            .unwrap();

        // Simulate a restart: worker forgets all state, generation bumps.
        workers[0].reset();
        provermux_kv::set_generation(&*manager.backend, 0, 1)
            .await
            .unwrap();

        let goals = manager
            .call(&session, "goals", json!({"state": leaf}), None)
            .await
            .unwrap();
        assert_eq!(goals["goals"], json!("A.vintro."));
    }

    #[tokio::test]
    async fn forced_timeout_marks_worker_for_restart() {
        let (manager, workers) = test_manager(1).await;
        let session = manager.create_session().await.unwrap();
        let root = manager
            .call(&session, "get_root_state", json!({"path": "A.v"}), None)
            .await
            .unwrap();

        workers[0].force_timeout_on("run");
        let err = manager
            .call(
                &session,
                "run",
                json!({"state": root.clone(), "tactic": "intro."}),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
        assert_eq!(
            provermux_kv::get_status(&*manager.backend, 0).await.unwrap(),
            Some(provermux_core::WorkerStatus::RestartNeeded)
        );

        // Subsequent call (after an operator/Arbiter restart would flip
        // status back to OK) still succeeds — the forced failure was
        // one-shot.
        provermux_kv::set_status(&*manager.backend, 0, provermux_core::WorkerStatus::Ok)
            .await
            .unwrap();
        manager
            .call(&session, "run", json!({"state": root, "tactic": "intro."}), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sessions_distribute_round_robin_across_workers() {
        let (manager, _workers) = test_manager(4).await;
        let mut counts = [0usize; 4];
        for _ in 0..100 {
            let session = manager.create_session().await.unwrap();
            let pet_idx = manager.caches.session(&*manager.backend, &session).await.unwrap().pet_idx;
            counts[pet_idx] += 1;
        }
        assert_eq!(counts, [25, 25, 25, 25]);
    }

    #[tokio::test]
    async fn status_is_false_while_any_worker_is_not_ok() {
        let (manager, _workers) = test_manager(2).await;
        assert!(manager.status().await.unwrap());
        provermux_kv::set_status(&*manager.backend, 1, provermux_core::WorkerStatus::RestartNeeded)
            .await
            .unwrap();
        assert!(!manager.status().await.unwrap());
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected_before_any_lock_is_taken() {
        let (manager, _workers) = test_manager(1).await;
        let session = manager.create_session().await.unwrap();

        let err = manager
            .call(
                &session,
                "get_root_state",
                json!({"path": "A.v"}),
                Some(Duration::from_secs(0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProtocolError(_)));

        // The lock was never taken, so a normal call still succeeds.
        manager
            .call(&session, "get_root_state", json!({"path": "A.v"}), None)
            .await
            .unwrap();
    }
}
