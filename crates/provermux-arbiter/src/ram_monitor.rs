// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RAM-monitor loop: polls every worker's RSS and flags it for restart if
//! it exceeds the configured limit. Never restarts directly — the
//! supervisor loop does that on its next probe.
//!
//! Grounded on `monitor_ram` in `original_source/inference/arbiter.py`
//! (which uses `psutil`); this crate uses `sysinfo` instead, the same
//! process-inspection crate `spineldb` depends on for RSS sampling.

use std::sync::Arc;
use std::time::Duration;

use provermux_core::WorkerStatus;
use provermux_kv::Backend;
use provermux_worker::WorkerHandle;
use sysinfo::{Pid, System};
use tokio::sync::Mutex;
use tracing::warn;

pub struct RamMonitor<B: Backend + ?Sized> {
    backend: Arc<B>,
    handles: Vec<Arc<Mutex<WorkerHandle>>>,
    max_ram_mb: u64,
    poll_interval: Duration,
}

impl<B: Backend + ?Sized> RamMonitor<B> {
    pub fn new(
        backend: Arc<B>,
        handles: Vec<Arc<Mutex<WorkerHandle>>>,
        max_ram_mb: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            handles,
            max_ram_mb,
            poll_interval,
        }
    }

    /// Run forever. A `max_ram_mb` of 0 disables the check entirely.
    pub async fn run(self) {
        if self.max_ram_mb == 0 {
            return;
        }

        let mut system = System::new_all();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            system.refresh_all();

            for (pet_idx, handle) in self.handles.iter().enumerate() {
                let pid = handle.lock().await.pid();
                let Some(pid) = pid else { continue };

                let Some(process) = system.process(Pid::from_u32(pid)) else {
                    continue;
                };
                let rss_mb = process.memory() / (1024 * 1024);
                if rss_mb > self.max_ram_mb {
                    warn!(
                        pet_idx,
                        rss_mb,
                        limit_mb = self.max_ram_mb,
                        "worker over RAM limit, scheduling restart"
                    );
                    if let Err(e) =
                        provermux_kv::set_status(&*self.backend, pet_idx, WorkerStatus::RestartNeeded)
                            .await
                    {
                        warn!(pet_idx, error = %e, "failed to flag worker for restart");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provermux_kv::fake::FakeBackend;

    #[tokio::test]
    async fn disabled_when_max_ram_is_zero() {
        let backend = Arc::new(FakeBackend::new());
        let handles = vec![Arc::new(Mutex::new(WorkerHandle::new(0, 9999, "true")))];
        let monitor = RamMonitor::new(backend, handles, 0, Duration::from_millis(1));

        // Should return immediately rather than looping forever.
        tokio::time::timeout(Duration::from_millis(100), monitor.run())
            .await
            .expect("disabled monitor returns promptly");
    }
}
