// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! provermux-core: shared types for the theorem-prover worker pool front-end.
//!
//! Every other `provermux-*` crate depends on this one for the error
//! taxonomy, the worker status enum, ID generation, and the `Clock`
//! abstraction used to keep deadline logic testable.

pub mod clock;
pub mod error;
pub mod id;
pub mod status;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::CoreError;
pub use id::ShortId;
pub use status::WorkerStatus;

define_id! {
    /// Unique identifier for a client session.
    pub struct SessionId;
}

define_id! {
    /// Unique identifier for a ParamsTree node.
    pub struct NodeId;
}

define_id! {
    /// Identifier for one tree in a session's ParamsTree forest.
    pub struct TreeId;
}
