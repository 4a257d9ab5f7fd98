// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process ownership and the opaque RPC boundary to a `pet-server`
//! subprocess: spawning, graceful/forceful termination, the route table
//! that classifies each call by its relationship to proof state, and a
//! transport (real TCP, or a deterministic fake for tests).

pub mod handle;
pub mod routes;
pub mod rpc;
pub mod tcp_client;

#[cfg(any(test, feature = "test-support"))]
pub mod fake_worker;

pub use handle::{WorkerHandle, WorkerHandleError, SETTLE_INTERVAL, TERMINATE_GRACE};
pub use routes::{route_kind, RouteKind};
pub use rpc::{WorkerError, WorkerRpc, TIMEOUT_ERROR_CODE};
pub use tcp_client::TcpLineWorker;

#[cfg(any(test, feature = "test-support"))]
pub use fake_worker::FakeWorker;
