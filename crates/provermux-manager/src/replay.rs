// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transparent state refresh: when a caller hands back a state handle
//! minted under a generation the owning worker has since moved past, this
//! module replays the recorded ParamsTree path that produced it against
//! the worker's current generation, without the caller ever finding out.
//!
//! Grounded on `SessionManager.update_state` and `_update_params` in
//! `original_source/inference/sessions.py`: `update_state` is the
//! single-state refresh (cache fast path, else walk the tree and replay);
//! `_update_params` is the "find this RPC's parent-state field" half, done
//! there by iterating a dataclass's `fields()` and replacing whichever one
//! is `State`-typed — mirrored here as a shallow scan over a JSON object's
//! top-level values, since this crate keeps params as opaque
//! [`serde_json::Value`] rather than typed per-route structs.
//!
//! `refresh_state` and `rewrite_params` are mutually recursive: refreshing
//! a state may require replaying an RPC whose own recorded params
//! reference a *different* stale state (from an earlier branch point),
//! and rewriting params may require refreshing the state embedded in
//! them. Neither is `async fn` — an `async fn` cannot call itself or a
//! sibling that calls it back without an infinitely-sized future — so
//! both return a boxed, pinned future by hand. They share a
//! [`ReplayCtx`], whose `mapping_state` field is the only piece that
//! mutates during the walk; it is guarded by a `tokio::sync::Mutex` so
//! the rest of the context can stay behind shared references.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use provermux_core::{CoreError, SessionId};
use provermux_kv::Backend;
use provermux_session::{MappingState, State};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::Caches;
use crate::connections::{map_worker_error, ConnectionPool};

/// Shared, mostly-immutable context threaded through a replay walk.
pub struct ReplayCtx<'a, B: Backend + ?Sized> {
    pub backend: &'a B,
    pub caches: &'a Caches,
    pub session_id: &'a SessionId,
    pub pet_idx: usize,
    pub current_generation: u64,
    pub pool: &'a ConnectionPool,
    pub default_timeout: Duration,
    pub mapping_state: AsyncMutex<MappingState>,
}

impl<'a, B: Backend + ?Sized> ReplayCtx<'a, B> {
    pub fn new(
        backend: &'a B,
        caches: &'a Caches,
        session_id: &'a SessionId,
        pet_idx: usize,
        current_generation: u64,
        pool: &'a ConnectionPool,
        default_timeout: Duration,
        mapping_state: MappingState,
    ) -> Self {
        Self {
            backend,
            caches,
            session_id,
            pet_idx,
            current_generation,
            pool,
            default_timeout,
            mapping_state: AsyncMutex::new(mapping_state),
        }
    }

    /// Consume the context, returning the (possibly mutated) mapping
    /// state for the caller to write through to the cache and store.
    pub async fn into_mapping_state(self) -> MappingState {
        self.mapping_state.into_inner()
    }
}

/// Parse a JSON value as a client-facing state handle: an object with a
/// string `st` and a `u64` `generation`. This is the shape a caller
/// echoes back (every state this crate ever hands out was tagged with
/// both fields); a bare worker response (`{"st": "..."}`) does not match
/// and is handled separately by [`tag_worker_state`].
pub(crate) fn parse_state_field(v: &Value) -> Option<State> {
    let obj = v.as_object()?;
    let st = obj.get("st")?.as_str()?.to_string();
    let generation = obj.get("generation")?.as_u64()?;
    Some(State::new(st, generation))
}

/// Find the first top-level field of a params object that looks like a
/// state handle, returning its field name and parsed value.
pub(crate) fn find_parent_state(params: &Value) -> Option<(String, State)> {
    let obj = params.as_object()?;
    for (field, value) in obj {
        if let Some(state) = parse_state_field(value) {
            return Some((field.clone(), state));
        }
    }
    None
}

/// Overwrite the state-shaped field of `params` in place with `state`.
fn set_parent_state(params: &mut Value, field: &str, state: &State) {
    if let Some(obj) = params.as_object_mut() {
        obj.insert(
            field.to_string(),
            serde_json::to_value(state).expect("State serializes"),
        );
    }
}

/// Pull the freshly-minted handle out of a worker's raw response
/// (`{"st": "<handle>", ...}`), tagging it with the generation it was
/// just produced under.
pub(crate) fn tag_worker_state(response: &Value, generation: u64) -> Option<State> {
    let handle = response.as_object()?.get("st")?.as_str()?;
    Some(State::new(handle, generation))
}

/// Refresh `old_state` to an equivalent state valid under the worker's
/// current generation, replaying history if necessary.
pub fn refresh_state<'a, B>(
    ctx: &'a ReplayCtx<'a, B>,
    old_state: State,
) -> Pin<Box<dyn Future<Output = Result<State, CoreError>> + Send + 'a>>
where
    B: Backend + ?Sized,
{
    Box::pin(async move {
        if old_state.is_current(ctx.current_generation) {
            return Ok(old_state);
        }

        let key = old_state.state_key();
        {
            let mapping_state = ctx.mapping_state.lock().await;
            if mapping_state.has_current_image(&key, ctx.current_generation) {
                return Ok(mapping_state
                    .get(&key)
                    .expect("has_current_image implies get")
                    .clone());
            }
        }

        let mapping_tree = ctx.caches.mapping_tree(ctx.backend, ctx.session_id).await?;
        let tree_id = match mapping_tree.get(&key) {
            Some(id) => id.clone(),
            None => {
                let reloaded = ctx
                    .caches
                    .reload_mapping_tree(ctx.backend, ctx.session_id)
                    .await?;
                reloaded.get(&key).cloned().ok_or_else(|| {
                    CoreError::NotFound(format!("no history tree indexes state {key}"))
                })?
            }
        };

        let tree = ctx
            .caches
            .params_tree(ctx.backend, ctx.session_id, &tree_id)
            .await?;
        let path = tree.find_path(&key)?;

        let mut produced: Option<State> = None;
        for node in path {
            {
                let mapping_state = ctx.mapping_state.lock().await;
                if mapping_state.has_current_image(&node.state_key, ctx.current_generation) {
                    produced = mapping_state.get(&node.state_key).cloned();
                    continue;
                }
            }

            let mut params = node.query_kwargs.params.clone();
            match (&produced, find_parent_state(&params)) {
                (Some(parent), Some((field, _))) => {
                    set_parent_state(&mut params, &field, parent);
                }
                (None, _) => {
                    rewrite_params(ctx, &mut params).await?;
                }
                (Some(_), None) => {}
            }

            let timeout = node
                .query_kwargs
                .timeout_duration()
                .unwrap_or(ctx.default_timeout);
            let response =
                call_worker(ctx, &node.query_kwargs.route_name, params, timeout).await?;
            let new_state = tag_worker_state(&response, ctx.current_generation).ok_or_else(|| {
                CoreError::Internal(format!(
                    "replaying {} did not yield a state",
                    node.query_kwargs.route_name
                ))
            })?;

            ctx.mapping_state
                .lock()
                .await
                .add(node.state_key.clone(), new_state.clone());
            produced = Some(new_state);
        }

        produced.ok_or_else(|| {
            CoreError::Internal(format!("empty replay path for state {key} found"))
        })
    })
}

/// Rewrite the (single) stale state-shaped field of `params` in place, if
/// any, to its current-generation equivalent.
pub fn rewrite_params<'a, B>(
    ctx: &'a ReplayCtx<'a, B>,
    params: &'a mut Value,
) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + 'a>>
where
    B: Backend + ?Sized,
{
    Box::pin(async move {
        let Some((field, old_state)) = find_parent_state(params) else {
            return Ok(());
        };
        if old_state.is_current(ctx.current_generation) {
            return Ok(());
        }
        let refreshed = refresh_state(ctx, old_state).await?;
        set_parent_state(params, &field, &refreshed);
        Ok(())
    })
}

async fn call_worker<B>(
    ctx: &ReplayCtx<'_, B>,
    route: &str,
    params: Value,
    timeout: Duration,
) -> Result<Value, CoreError>
where
    B: Backend + ?Sized,
{
    let mut slot = ctx.pool.slot(ctx.pet_idx).lock().await;
    let conn = slot.as_mut().ok_or_else(|| {
        CoreError::Internal(format!("no connection cached for worker {}", ctx.pet_idx))
    })?;
    conn.worker
        .call(route, params, timeout)
        .await
        .map_err(map_worker_error)
}
