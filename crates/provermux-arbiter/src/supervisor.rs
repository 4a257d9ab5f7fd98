// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-worker supervisor loop: subscribes to `arbiter:req:<i>` and, on
//! every probe, checks liveness, restarts if needed, replies, and bumps the
//! liveness heartbeat.
//!
//! Grounded on `monitor_redis_for_restarts` in
//! `original_source/inference/arbiter.py`.

use std::sync::Arc;
use std::time::Duration;

use provermux_core::WorkerStatus;
use provermux_kv::{keys, Backend, ProbeReply, ProbeRequest};
use provermux_worker::WorkerHandle;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Drives one worker's lifecycle in response to arbiter probes.
pub struct Supervisor<B: Backend + ?Sized> {
    pet_idx: usize,
    backend: Arc<B>,
    handle: Arc<Mutex<WorkerHandle>>,
    settle_interval: Duration,
}

impl<B: Backend + ?Sized> Supervisor<B> {
    pub fn new(
        pet_idx: usize,
        backend: Arc<B>,
        handle: Arc<Mutex<WorkerHandle>>,
        settle_interval: Duration,
    ) -> Self {
        Self {
            pet_idx,
            backend,
            handle,
            settle_interval,
        }
    }

    /// Run forever, processing probes until the channel closes (only
    /// happens when the backend itself is torn down).
    pub async fn run(self) {
        let channel = keys::arbiter_req_channel(self.pet_idx);
        let mut sub = match self.backend.subscribe(&channel).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(pet_idx = self.pet_idx, error = %e, "supervisor failed to subscribe");
                return;
            }
        };

        info!(pet_idx = self.pet_idx, "supervisor loop started");
        while let Some(payload) = sub.recv().await {
            if let Err(e) = self.handle_probe(&payload).await {
                warn!(pet_idx = self.pet_idx, error = %e, "supervisor tick failed, retrying next probe");
            }
        }
        info!(pet_idx = self.pet_idx, "supervisor loop exiting");
    }

    async fn handle_probe(&self, payload: &[u8]) -> Result<(), provermux_kv::KvError> {
        let req: ProbeRequest = serde_json::from_slice(payload)
            .map_err(|e| provermux_kv::KvError::Protocol(format!("decode probe: {e}")))?;

        // (a) Poll the subprocess.
        {
            let mut handle = self.handle.lock().await;
            if handle.has_exited() {
                warn!(pet_idx = self.pet_idx, "detected crashed worker");
                provermux_kv::set_status(&*self.backend, self.pet_idx, WorkerStatus::RestartNeeded)
                    .await?;
            }
        }

        // (b) React to a restart request (whether just raised above, an
        // operator-requested restart, or a RAM-limit trip).
        let status = provermux_kv::get_status(&*self.backend, self.pet_idx).await?;
        if status == Some(WorkerStatus::RestartNeeded) {
            self.restart().await?;
        }

        // (c) Reply.
        let reply = ProbeReply::ok(req.id);
        let bytes = serde_json::to_vec(&reply)
            .map_err(|e| provermux_kv::KvError::Protocol(format!("encode probe reply: {e}")))?;
        self.backend.publish(&req.reply_to, &bytes).await?;

        // (d) Bump the liveness heartbeat.
        provermux_kv::bump_monitor_epoch(&*self.backend, self.pet_idx).await?;

        Ok(())
    }

    /// `restart(i)`: terminate, respawn, bump generation, settle, flip back
    /// to OK.
    async fn restart(&self) -> Result<(), provermux_kv::KvError> {
        info!(pet_idx = self.pet_idx, "restarting worker");
        provermux_kv::set_status(&*self.backend, self.pet_idx, WorkerStatus::Restarting).await?;

        let mut handle = self.handle.lock().await;
        handle.terminate().await;
        if let Err(e) = handle.spawn() {
            warn!(pet_idx = self.pet_idx, error = %e, "restart failed, will retry on next probe");
            // Leave status RESTART_NEEDED so the next probe retries.
            return Ok(());
        }
        drop(handle);

        let generation = provermux_kv::get_generation(&*self.backend, self.pet_idx).await?;
        provermux_kv::set_generation(&*self.backend, self.pet_idx, generation + 1).await?;

        tokio::time::sleep(self.settle_interval).await;
        provermux_kv::set_status(&*self.backend, self.pet_idx, WorkerStatus::Ok).await?;
        info!(pet_idx = self.pet_idx, generation = generation + 1, "worker restarted");
        Ok(())
    }
}
