// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Manager configuration, following the same
//! typed-accessor-over-environment-variables pattern as
//! `provermux_arbiter::Config`.

use std::time::Duration;

use provermux_core::CoreError;

/// Grace added on top of a caller's timeout (or `timeout_ok`) when
/// extending the worker lock, so the lock never expires mid-RPC.
pub const DEFAULT_TIMEOUT_EPS: Duration = Duration::from_secs(10);

/// Default wait for the Arbiter's probe reply.
pub const DEFAULT_TIMEOUT_OK: Duration = Duration::from_secs(15);

/// Default RPC timeout when a caller does not supply one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    /// `N`: number of worker subprocesses.
    pub num_pet_server: usize,
    /// Workers listen on `base_port + i`.
    pub base_port: u16,
    /// KV store connection URL.
    pub kv_url: String,
    /// How long to wait for an Arbiter probe reply before failing
    /// `UNAVAILABLE` (grounded on `SessionManager.timeout_ok` in
    /// `original_source/inference/sessions.py`).
    pub timeout_ok: Duration,
    /// Grace added to lock TTLs on top of a call's effective timeout.
    pub timeout_eps: Duration,
    /// RPC timeout used when a caller's `call()` omits one.
    pub default_call_timeout: Duration,
}

impl Config {
    /// Load from environment variables: `NUM_PET_SERVER`,
    /// `PET_SERVER_START_PORT`, `KV_URL` (falling back to `REDIS_URL`),
    /// `TIMEOUT_OK_SECS`, `TIMEOUT_EPS_SECS`, `DEFAULT_CALL_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, CoreError> {
        Ok(Self {
            num_pet_server: parse_env("NUM_PET_SERVER", 4)?,
            base_port: parse_env("PET_SERVER_START_PORT", 8765)?,
            kv_url: std::env::var("KV_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            timeout_ok: Duration::from_secs(parse_env("TIMEOUT_OK_SECS", 15)?),
            timeout_eps: Duration::from_secs(parse_env("TIMEOUT_EPS_SECS", 10)?),
            default_call_timeout: Duration::from_secs(parse_env(
                "DEFAULT_CALL_TIMEOUT_SECS",
                60,
            )?),
        })
    }

    pub fn port_for(&self, pet_idx: usize) -> u16 {
        self.base_port + pet_idx as u16
    }

    /// Lock TTL for acquiring `pet_lock:i`: baseline plus epsilon.
    pub fn acquire_ttl(&self) -> Duration {
        self.timeout_ok + self.timeout_eps
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoreError::Internal(format!("{name}={raw:?} is not valid"))),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(CoreError::Internal(format!("{name} is not valid UTF-8")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("NUM_PET_SERVER");
        std::env::remove_var("PET_SERVER_START_PORT");
        std::env::remove_var("TIMEOUT_OK_SECS");
        let config = Config::from_env().unwrap();
        assert_eq!(config.num_pet_server, 4);
        assert_eq!(config.base_port, 8765);
        assert_eq!(config.timeout_ok, Duration::from_secs(15));
        assert_eq!(config.acquire_ttl(), Duration::from_secs(25));
    }

    #[test]
    fn reads_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("NUM_PET_SERVER", "8");
        std::env::set_var("PET_SERVER_START_PORT", "9000");
        let config = Config::from_env().unwrap();
        assert_eq!(config.num_pet_server, 8);
        assert_eq!(config.port_for(3), 9003);
        std::env::remove_var("NUM_PET_SERVER");
        std::env::remove_var("PET_SERVER_START_PORT");
    }

    #[test]
    fn invalid_value_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TIMEOUT_OK_SECS", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
        std::env::remove_var("TIMEOUT_OK_SECS");
    }
}
