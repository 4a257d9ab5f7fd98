// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! arbiterd: the Arbiter process. Owns the `pet-server` pool for its
//! lifetime; blocks until SIGINT/SIGTERM, then runs the Shutdown sequence
//! and exits.
//!
//! Signal wiring follows `ojd::main` (`tokio::signal::unix` for both
//! signals, `tokio::select!` to race them against steady-state work).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use provermux_arbiter::{Arbiter, Config};
use provermux_kv::RedisBackend;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    setup_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("arbiterd: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let backend = match RedisBackend::connect(&config.kv_url).await {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("arbiterd: failed to connect to KV store: {e}");
            std::process::exit(1);
        }
    };

    let arbiter = match Arbiter::start(config, backend).await {
        Ok(arbiter) => arbiter,
        Err(e) => {
            error!(error = %e, "arbiterd failed to start");
            std::process::exit(1);
        }
    };

    info!("arbiterd ready");

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    if let Err(e) = arbiter.shutdown().await {
        error!(error = %e, "error during shutdown");
        std::process::exit(1);
    }
    info!("arbiterd stopped");
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
