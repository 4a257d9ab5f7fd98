// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arbiter configuration loaded from environment variables, following the
//! `oj-daemon::env` pattern of typed accessors with explicit defaults over
//! inline `std::env::var` calls.

use std::time::Duration;

use crate::error::ArbiterError;

/// Default settling interval after (re)spawning a worker.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(3);

/// Default RAM-monitor poll interval.
pub const DEFAULT_RAM_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    /// `N`: number of worker subprocesses.
    pub num_pet_server: usize,
    /// Workers listen on `base_port + i`.
    pub base_port: u16,
    /// 0 disables the RAM check.
    pub max_ram_mb: u64,
    /// KV store connection URL.
    pub kv_url: String,
    /// Worker executable, launched as `<pet_cmd> -p <port>`.
    pub pet_cmd: String,
    pub settle_interval: Duration,
    pub ram_poll_interval: Duration,
}

impl Config {
    /// Load from environment variables:
    /// `NUM_PET_SERVER`, `PET_SERVER_START_PORT`, `MAX_RAM_PER_PET`,
    /// `KV_URL` (falling back to `REDIS_URL`), `PET_CMD`.
    pub fn from_env() -> Result<Self, ArbiterError> {
        Ok(Self {
            num_pet_server: parse_env("NUM_PET_SERVER", 1)?,
            base_port: parse_env("PET_SERVER_START_PORT", 8765)?,
            max_ram_mb: parse_env("MAX_RAM_PER_PET", 0)?,
            kv_url: std::env::var("KV_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            pet_cmd: std::env::var("PET_CMD").unwrap_or_else(|_| "pet-server".to_string()),
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            ram_poll_interval: DEFAULT_RAM_POLL_INTERVAL,
        })
    }

    pub fn port_for(&self, pet_idx: usize) -> u16 {
        self.base_port + pet_idx as u16
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ArbiterError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ArbiterError::Config(format!("{name}={raw:?} is not valid"))),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(ArbiterError::Config(format!("{name} is not valid UTF-8")))
        }
    }
}
