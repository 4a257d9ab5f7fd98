// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker subprocess handle (C3): owns one `pet-server` child process and
//! knows how to terminate and respawn it.

use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Grace period given to a terminated worker before it is force-killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Settling interval after spawning a worker, before it is assumed ready.
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum WorkerHandleError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One worker subprocess slot: fixed index and port, the live child (if
/// any), and the generation it is currently running under.
pub struct WorkerHandle {
    pub pet_idx: usize,
    pub port: u16,
    pet_cmd: String,
    child: Option<Child>,
}

impl WorkerHandle {
    pub fn new(pet_idx: usize, port: u16, pet_cmd: impl Into<String>) -> Self {
        Self {
            pet_idx,
            port,
            pet_cmd: pet_cmd.into(),
            child: None,
        }
    }

    /// Spawn `<pet_cmd> -p <port>`, replacing any previous child reference
    /// (the caller is responsible for having terminated it first via
    /// [`Self::terminate`]).
    pub fn spawn(&mut self) -> Result<(), WorkerHandleError> {
        let child = Command::new(&self.pet_cmd)
            .arg("-p")
            .arg(self.port.to_string())
            .kill_on_drop(true)
            .spawn()?;
        info!(pet_idx = self.pet_idx, port = self.port, pid = ?child.id(), "spawned worker");
        self.child = Some(child);
        Ok(())
    }

    /// Has the subprocess exited on its own (crash)?
    pub fn has_exited(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(Some(_)) | Err(_)),
            None => true,
        }
    }

    /// OS process id of the current child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Terminate the current child: send `SIGTERM`, give it
    /// [`TERMINATE_GRACE`] to exit on its own, then force-kill.
    pub async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Some(pid) = child.id() {
            send_signal("-15", pid).await;
        }

        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!(
                    pet_idx = self.pet_idx,
                    "worker did not exit within grace period, force-killing"
                );
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }
    }
}

/// Send `kill <signal> <pid>`, ignoring failure (the process may have
/// already exited on its own).
async fn send_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
