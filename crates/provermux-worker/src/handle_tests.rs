// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn spawns_and_detects_exit() {
    // `true` exits immediately with status 0 — stands in for a crashed
    // worker without needing the real `pet-server` binary.
    let mut handle = WorkerHandle::new(0, 9999, "true");
    handle.spawn().expect("spawn");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.has_exited());
}

#[tokio::test]
async fn terminate_is_idempotent_with_no_child() {
    let mut handle = WorkerHandle::new(0, 9999, "true");
    handle.terminate().await;
    assert!(handle.has_exited());
}

#[tokio::test]
async fn terminate_reaps_a_long_running_child() {
    let mut handle = WorkerHandle::new(0, 9999, "sleep");
    // `sleep` without args exits immediately with usage error on most
    // systems; use a long-running invocation instead.
    let mut cmd = Command::new("sleep");
    cmd.arg("30").kill_on_drop(true);
    let child = cmd.spawn().expect("spawn sleep");
    handle.child = Some(child);

    handle.terminate().await;
    assert!(handle.has_exited());
}
