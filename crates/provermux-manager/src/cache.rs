// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process read-through/write-through caches over the four session
//! record kinds, layered on `provermux_session::store`.
//!
//! Grounded on `SessionManager`'s `session_cache`, `mapping_state_cache`,
//! `mappings_tree_cache`, and `params_tree_cache` dicts in
//! `original_source/inference/sessions.py`, and on the `*_cache_update`
//! methods' cache-miss-falls-back-to-store, mutation-writes-through-both
//! pattern. `parking_lot::Mutex` guards each table: critical sections are
//! plain `HashMap` operations with no `.await` held across them, so the
//! lighter non-async mutex is enough (matching how `provermux-arbiter`
//! guards its own in-memory state).

use std::collections::HashMap;

use parking_lot::Mutex;
use provermux_core::{CoreError, SessionId, TreeId};
use provermux_kv::Backend;
use provermux_session::{store, MappingState, MappingTree, ParamsTree, Session};

#[derive(Default)]
pub struct Caches {
    sessions: Mutex<HashMap<SessionId, Session>>,
    mapping_states: Mutex<HashMap<SessionId, MappingState>>,
    mapping_trees: Mutex<HashMap<SessionId, MappingTree>>,
    params_trees: Mutex<HashMap<(SessionId, TreeId), ParamsTree>>,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
    ) -> Result<Session, CoreError> {
        if let Some(session) = self.sessions.lock().get(id).cloned() {
            return Ok(session);
        }
        let session = store::load_session(backend, id).await?;
        self.sessions.lock().insert(id.clone(), session.clone());
        Ok(session)
    }

    pub async fn put_session<B: Backend + ?Sized>(
        &self,
        backend: &B,
        session: &Session,
    ) -> Result<(), CoreError> {
        store::save_session(backend, session).await?;
        self.sessions
            .lock()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    /// Force a re-read from the store, bypassing (and refreshing) the
    /// cache. Used when a consistency check on a cached value fails, the
    /// same way `_get_worker`'s callers re-load state that the cache
    /// turned out to be behind on.
    pub async fn reload_session<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
    ) -> Result<Session, CoreError> {
        let session = store::load_session(backend, id).await?;
        self.sessions.lock().insert(id.clone(), session.clone());
        Ok(session)
    }

    pub async fn mapping_state<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
    ) -> Result<MappingState, CoreError> {
        if let Some(state) = self.mapping_states.lock().get(id).cloned() {
            return Ok(state);
        }
        let state = store::load_mapping_state(backend, id).await?;
        self.mapping_states.lock().insert(id.clone(), state.clone());
        Ok(state)
    }

    pub async fn put_mapping_state<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
        state: &MappingState,
    ) -> Result<(), CoreError> {
        store::save_mapping_state(backend, id, state).await?;
        self.mapping_states.lock().insert(id.clone(), state.clone());
        Ok(())
    }

    pub async fn mapping_tree<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
    ) -> Result<MappingTree, CoreError> {
        if let Some(tree) = self.mapping_trees.lock().get(id).cloned() {
            return Ok(tree);
        }
        let tree = store::load_mapping_tree(backend, id).await?;
        self.mapping_trees.lock().insert(id.clone(), tree.clone());
        Ok(tree)
    }

    pub async fn put_mapping_tree<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
        tree: &MappingTree,
    ) -> Result<(), CoreError> {
        store::save_mapping_tree(backend, id, tree).await?;
        self.mapping_trees.lock().insert(id.clone(), tree.clone());
        Ok(())
    }

    /// Re-read a `MappingTree` from the store, for when a cached copy
    /// doesn't contain a state a caller expected it to.
    pub async fn reload_mapping_tree<B: Backend + ?Sized>(
        &self,
        backend: &B,
        id: &SessionId,
    ) -> Result<MappingTree, CoreError> {
        let tree = store::load_mapping_tree(backend, id).await?;
        self.mapping_trees.lock().insert(id.clone(), tree.clone());
        Ok(tree)
    }

    pub async fn params_tree<B: Backend + ?Sized>(
        &self,
        backend: &B,
        session_id: &SessionId,
        tree_id: &TreeId,
    ) -> Result<ParamsTree, CoreError> {
        let cache_key = (session_id.clone(), tree_id.clone());
        if let Some(tree) = self.params_trees.lock().get(&cache_key).cloned() {
            return Ok(tree);
        }
        let tree = store::load_params_tree(backend, session_id, tree_id).await?;
        self.params_trees.lock().insert(cache_key, tree.clone());
        Ok(tree)
    }

    pub async fn put_params_tree<B: Backend + ?Sized>(
        &self,
        backend: &B,
        session_id: &SessionId,
        tree_id: &TreeId,
        tree: &ParamsTree,
    ) -> Result<(), CoreError> {
        store::save_params_tree(backend, session_id, tree_id, tree).await?;
        self.params_trees
            .lock()
            .insert((session_id.clone(), tree_id.clone()), tree.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provermux_kv::FakeBackend;

    #[tokio::test]
    async fn session_is_cached_after_first_load() {
        let backend = FakeBackend::new();
        let caches = Caches::new();
        let session = Session::new(2);
        store::save_session(&backend, &session).await.unwrap();

        let first = caches.session(&backend, &session.id).await.unwrap();
        // mutate the store directly; the cache should still serve the old value
        let mut moved = session.clone();
        moved.pet_idx = 9;
        store::save_session(&backend, &moved).await.unwrap();
        let second = caches.session(&backend, &session.id).await.unwrap();

        assert_eq!(first.pet_idx, 2);
        assert_eq!(second.pet_idx, 2);
    }

    #[tokio::test]
    async fn put_mapping_state_writes_through() {
        let backend = FakeBackend::new();
        let caches = Caches::new();
        let id = SessionId::generate();
        let mut state = MappingState::default();
        state.add("0:root", provermux_session::State::new("0:root", 0));
        caches.put_mapping_state(&backend, &id, &state).await.unwrap();

        let reloaded = store::load_mapping_state(&backend, &id).await.unwrap();
        assert!(reloaded.contains("0:root"));
    }

    #[tokio::test]
    async fn reload_mapping_tree_bypasses_cache() {
        let backend = FakeBackend::new();
        let caches = Caches::new();
        let id = SessionId::generate();
        let mut tree = MappingTree::new();
        let tree_id = TreeId::generate();
        tree.add("0:root", tree_id.clone());
        caches.put_mapping_tree(&backend, &id, &tree).await.unwrap();
        caches.mapping_tree(&backend, &id).await.unwrap();

        let mut updated = tree.clone();
        updated.add("0:child", TreeId::generate());
        store::save_mapping_tree(&backend, &id, &updated).await.unwrap();

        let reloaded = caches.reload_mapping_tree(&backend, &id).await.unwrap();
        assert!(reloaded.contains("0:child"));
    }
}
