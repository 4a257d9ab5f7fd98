// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start and Shutdown sequences, tying together worker handles, the
//! per-worker supervisor loops, and the RAM monitor.
//!
//! Grounded on `main`/`_shutdown` in `original_source/inference/arbiter.py`.

use std::ffi::OsStr;
use std::sync::Arc;

use provermux_core::WorkerStatus;
use provermux_kv::{keys, Backend};
use provermux_worker::WorkerHandle;
use sysinfo::System;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::ArbiterError;
use crate::ram_monitor::RamMonitor;
use crate::supervisor::Supervisor;

/// A running Arbiter: owns every worker handle and the background tasks
/// driving them. Dropping this without calling [`Arbiter::shutdown`] will
/// abort the tasks but will not clear KV state or terminate workers —
/// always call `shutdown`.
pub struct Arbiter<B: Backend + ?Sized> {
    config: Config,
    backend: Arc<B>,
    handles: Vec<Arc<Mutex<WorkerHandle>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<B: Backend + ?Sized> Arbiter<B> {
    /// Run the Start sequence: clear KV state, kill stragglers, spawn
    /// workers, settle, mark ready, and launch the background tasks.
    pub async fn start(config: Config, backend: Arc<B>) -> Result<Self, ArbiterError> {
        clear_all_keys(&*backend, config.num_pet_server).await?;
        kill_lingering_workers(&config.pet_cmd);

        let mut handles = Vec::with_capacity(config.num_pet_server);
        for pet_idx in 0..config.num_pet_server {
            let port = config.port_for(pet_idx);
            let mut handle = WorkerHandle::new(pet_idx, port, config.pet_cmd.clone());
            handle
                .spawn()
                .map_err(|source| ArbiterError::Spawn { pet_idx, source })?;
            handles.push(Arc::new(Mutex::new(handle)));
        }

        tokio::time::sleep(config.settle_interval).await;

        for pet_idx in 0..config.num_pet_server {
            provermux_kv::set_status(&*backend, pet_idx, WorkerStatus::Ok).await?;
            provermux_kv::set_generation(&*backend, pet_idx, 0).await?;
        }

        backend
            .set(keys::arbiter_ready_key(), b"1")
            .await
            .map_err(ArbiterError::Kv)?;

        let mut tasks = Vec::with_capacity(config.num_pet_server + 1);
        for (pet_idx, handle) in handles.iter().enumerate() {
            let supervisor = Supervisor::new(
                pet_idx,
                backend.clone(),
                handle.clone(),
                config.settle_interval,
            );
            tasks.push(tokio::spawn(supervisor.run()));
        }

        let ram_monitor = RamMonitor::new(
            backend.clone(),
            handles.clone(),
            config.max_ram_mb,
            config.ram_poll_interval,
        );
        tasks.push(tokio::spawn(ram_monitor.run()));

        info!(
            num_pet_server = config.num_pet_server,
            "arbiter started, all workers ready"
        );

        Ok(Self {
            config,
            backend,
            handles,
            tasks,
        })
    }

    /// Run the Shutdown sequence: terminate every worker and clear all
    /// core keys, then stop the background tasks.
    pub async fn shutdown(mut self) -> Result<(), ArbiterError> {
        for (pet_idx, handle) in self.handles.iter().enumerate() {
            let mut handle = handle.lock().await;
            handle.terminate().await;
            provermux_kv::set_status(&*self.backend, pet_idx, WorkerStatus::Down).await?;
        }

        clear_all_keys(&*self.backend, self.config.num_pet_server).await?;

        for task in self.tasks.drain(..) {
            task.abort();
        }

        info!("arbiter shut down");
        Ok(())
    }
}

async fn clear_all_keys<B: Backend + ?Sized>(
    backend: &B,
    num_pet_server: usize,
) -> Result<(), ArbiterError> {
    for pattern in keys::all_key_patterns(num_pet_server) {
        for key in backend.scan(&pattern).await.map_err(ArbiterError::Kv)? {
            backend.delete(&key).await.map_err(ArbiterError::Kv)?;
        }
    }
    Ok(())
}

/// Kill any lingering worker processes by executable name — a safety net
/// for a crashed-and-restarted Arbiter that left orphans behind.
fn kill_lingering_workers(pet_cmd: &str) {
    let exe_name = std::path::Path::new(pet_cmd)
        .file_name()
        .unwrap_or_else(|| OsStr::new(pet_cmd));

    let mut system = System::new_all();
    system.refresh_all();
    for process in system.processes_by_name(exe_name) {
        process.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provermux_kv::fake::FakeBackend;

    fn test_config() -> Config {
        Config {
            num_pet_server: 2,
            base_port: 19000,
            max_ram_mb: 0,
            kv_url: "unused".to_string(),
            pet_cmd: "true".to_string(),
            settle_interval: std::time::Duration::from_millis(5),
            ram_poll_interval: std::time::Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn start_marks_all_workers_ok_and_ready() {
        let backend = Arc::new(FakeBackend::new());
        let arbiter = Arbiter::start(test_config(), backend.clone()).await.unwrap();

        for pet_idx in 0..2 {
            assert_eq!(
                provermux_kv::get_status(&*backend, pet_idx).await.unwrap(),
                Some(WorkerStatus::Ok)
            );
        }
        assert_eq!(
            backend.get(keys::arbiter_ready_key()).await.unwrap(),
            Some(b"1".to_vec())
        );

        arbiter.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_clears_status_and_ready_key() {
        let backend = Arc::new(FakeBackend::new());
        let arbiter = Arbiter::start(test_config(), backend.clone()).await.unwrap();
        arbiter.shutdown().await.unwrap();

        assert_eq!(
            backend.get(keys::arbiter_ready_key()).await.unwrap(),
            None
        );
    }
}
