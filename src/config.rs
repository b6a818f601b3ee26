//! Host configuration.
//!
//! Settings come from `host.yaml` under the base directory, then environment
//! variables override the file. The env contract is intentionally small:
//!
//! - `TENEMENT_LISTEN_PORT`: listener port
//! - `TENEMENT_LISTEN_ADDRESS`: listener bind address
//! - `TENEMENT_TRUSTED_PROXY`: trust `X-Forwarded-For` for client addresses

use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "host.yaml";

const LISTEN_PORT_ENV: &str = "TENEMENT_LISTEN_PORT";
const LISTEN_ADDRESS_ENV: &str = "TENEMENT_LISTEN_ADDRESS";
const TRUSTED_PROXY_ENV: &str = "TENEMENT_TRUSTED_PROXY";

/// Worker pool sizing, applied to every deployed application.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker coroutines per application
    pub workers: usize,
    /// In-flight dispatch limit per application; beyond it requests are
    /// answered 503
    pub queue_bound: usize,
    /// Stack size for worker coroutines in bytes
    pub stack_size: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_bound: 1024,
            stack_size: 0x10000, // 64KB
        }
    }
}

/// Host-level configuration, file plus environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub listen_address: String,
    pub listen_port: u16,
    /// When true the first `X-Forwarded-For` hop is taken as the client
    /// address for session binding.
    pub trusted_proxy: bool,
    /// Seconds between session expiration sweeps
    pub sweep_interval_secs: u64,
    pub worker: WorkerSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 8080,
            trusted_proxy: false,
            sweep_interval_secs: 30,
            worker: WorkerSettings::default(),
        }
    }
}

impl HostConfig {
    /// Load `host.yaml` from the base directory and apply env overrides.
    ///
    /// A missing or unreadable file is an error; the host cannot do useful
    /// work without knowing where to listen.
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let path = base_dir.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: HostConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides on top of whatever the file said.
    ///
    /// Unparseable values keep the file's setting and log a warning rather
    /// than aborting startup.
    pub fn apply_env(&mut self) {
        if let Ok(port) = env::var(LISTEN_PORT_ENV) {
            match port.parse::<u16>() {
                Ok(p) => {
                    self.listen_port = p;
                    debug!(var = LISTEN_PORT_ENV, value = p, "using env override");
                }
                Err(_) => warn!(var = LISTEN_PORT_ENV, value = %port, "ignoring unparseable override"),
            }
        }
        if let Ok(addr) = env::var(LISTEN_ADDRESS_ENV) {
            debug!(var = LISTEN_ADDRESS_ENV, value = %addr, "using env override");
            self.listen_address = addr;
        }
        if let Ok(trusted) = env::var(TRUSTED_PROXY_ENV) {
            match trusted.parse::<bool>() {
                Ok(t) => {
                    self.trusted_proxy = t;
                    debug!(var = TRUSTED_PROXY_ENV, value = t, "using env override");
                }
                Err(_) => warn!(var = TRUSTED_PROXY_ENV, value = %trusted, "ignoring unparseable override"),
            }
        }
    }

    /// Socket address string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}
