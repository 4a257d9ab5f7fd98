// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KV persistence for the session data model, implementing the four
//! record kinds' `to_redis`/`from_redis` pair from
//! `original_source/inference/session_model.py` over [`provermux_kv::Backend`].
//!
//! This module is deliberately free of caching: read-through/write-through
//! discipline is the Session Manager's responsibility, layered on top of
//! these always-hits-the-store calls.

use provermux_core::{CoreError, SessionId, TreeId};
use provermux_kv::{keys, Backend, KvError, KvSerde};

use crate::mapping_state::MappingState;
use crate::mapping_tree::MappingTree;
use crate::params_tree::ParamsTree;
use crate::session::Session;

fn kv_err(context: &str, e: KvError) -> CoreError {
    match e {
        KvError::Connection(msg) => CoreError::Unavailable(format!("{context}: {msg}")),
        KvError::Protocol(msg) => CoreError::Internal(format!("{context}: {msg}")),
    }
}

pub async fn load_session<B: Backend + ?Sized>(
    backend: &B,
    id: &SessionId,
) -> Result<Session, CoreError> {
    let key = keys::session_key(id.as_str());
    backend
        .get_json::<Session>(&key)
        .await
        .map_err(|e| kv_err("load session", e))?
        .ok_or_else(|| CoreError::NotFound(format!("session {id} not found")))
}

pub async fn save_session<B: Backend + ?Sized>(
    backend: &B,
    session: &Session,
) -> Result<(), CoreError> {
    let key = keys::session_key(session.id.as_str());
    backend
        .set_json(&key, session)
        .await
        .map_err(|e| kv_err("save session", e))
}

pub async fn load_mapping_state<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
) -> Result<MappingState, CoreError> {
    let key = keys::mapping_state_key(session_id.as_str());
    Ok(backend
        .get_json::<MappingState>(&key)
        .await
        .map_err(|e| kv_err("load mapping_state", e))?
        .unwrap_or_default())
}

pub async fn save_mapping_state<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
    mapping_state: &MappingState,
) -> Result<(), CoreError> {
    let key = keys::mapping_state_key(session_id.as_str());
    backend
        .set_json(&key, mapping_state)
        .await
        .map_err(|e| kv_err("save mapping_state", e))
}

pub async fn load_mapping_tree<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
) -> Result<MappingTree, CoreError> {
    let key = keys::mapping_tree_key(session_id.as_str());
    Ok(backend
        .get_json::<MappingTree>(&key)
        .await
        .map_err(|e| kv_err("load mapping_tree", e))?
        .unwrap_or_default())
}

pub async fn save_mapping_tree<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
    mapping_tree: &MappingTree,
) -> Result<(), CoreError> {
    let key = keys::mapping_tree_key(session_id.as_str());
    backend
        .set_json(&key, mapping_tree)
        .await
        .map_err(|e| kv_err("save mapping_tree", e))
}

pub async fn load_params_tree<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
    tree_id: &TreeId,
) -> Result<ParamsTree, CoreError> {
    let key = keys::params_tree_key(session_id.as_str(), tree_id.as_str());
    backend
        .get_json::<ParamsTree>(&key)
        .await
        .map_err(|e| kv_err("load params_tree", e))?
        .ok_or_else(|| CoreError::NotFound(format!("params_tree {tree_id} not found")))
}

pub async fn save_params_tree<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
    tree_id: &TreeId,
    tree: &ParamsTree,
) -> Result<(), CoreError> {
    let key = keys::params_tree_key(session_id.as_str(), tree_id.as_str());
    backend
        .set_json(&key, tree)
        .await
        .map_err(|e| kv_err("save params_tree", e))
}

/// Administrative archival: move a session's record and the tree ids it
/// owns into the append-only archive list, then delete the live
/// per-session keys. Never invoked from `call`.
pub async fn archive_session<B: Backend + ?Sized>(
    backend: &B,
    session_id: &SessionId,
) -> Result<(), CoreError> {
    let session = load_session(backend, session_id).await?;
    let mapping_tree = load_mapping_tree(backend, session_id).await.ok();

    backend
        .append_json(keys::archived_sessions_key(), &session)
        .await
        .map_err(|e| kv_err("archive session record", e))?;

    if let Some(mapping_tree) = mapping_tree {
        for tree_id in mapping_tree.mapping.values() {
            let tree_key = keys::params_tree_key(session_id.as_str(), tree_id.as_str());
            backend
                .delete(&tree_key)
                .await
                .map_err(|e| kv_err("delete archived params_tree", e))?;
        }
    }

    backend
        .delete(&keys::session_key(session_id.as_str()))
        .await
        .map_err(|e| kv_err("delete session", e))?;
    backend
        .delete(&keys::mapping_state_key(session_id.as_str()))
        .await
        .map_err(|e| kv_err("delete mapping_state", e))?;
    backend
        .delete(&keys::mapping_tree_key(session_id.as_str()))
        .await
        .map_err(|e| kv_err("delete mapping_tree", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provermux_kv::FakeBackend;

    #[tokio::test]
    async fn session_round_trips_through_store() {
        let backend = FakeBackend::new();
        let session = Session::new(1);
        save_session(&backend, &session).await.unwrap();
        let loaded = load_session(&backend, &session.id).await.unwrap();
        assert_eq!(loaded.pet_idx, 1);
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let backend = FakeBackend::new();
        let id = SessionId::generate();
        let err = load_session(&backend, &id).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn mapping_state_defaults_to_empty_when_absent() {
        let backend = FakeBackend::new();
        let id = SessionId::generate();
        let mapping = load_mapping_state(&backend, &id).await.unwrap();
        assert!(mapping.mapping.is_empty());
    }

    #[tokio::test]
    async fn archive_session_removes_live_keys() {
        let backend = FakeBackend::new();
        let session = Session::new(0);
        save_session(&backend, &session).await.unwrap();
        let mut mapping_tree = MappingTree::new();
        let tree_id = TreeId::generate();
        mapping_tree.add("0:root", tree_id.clone());
        save_mapping_tree(&backend, &session.id, &mapping_tree)
            .await
            .unwrap();
        let tree = ParamsTree::new(
            "0:root",
            crate::query::QueryKwargs::new("get_root_state", serde_json::json!({}), None),
        );
        save_params_tree(&backend, &session.id, &tree_id, &tree)
            .await
            .unwrap();

        archive_session(&backend, &session.id).await.unwrap();

        assert!(load_session(&backend, &session.id).await.is_err());
        let archived: Vec<Session> = backend
            .get_json_list(keys::archived_sessions_key())
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, session.id);
    }
}
