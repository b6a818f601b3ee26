//! Error types for the host's three containment tiers.
//!
//! Fatal-at-start conditions surface as [`ConfigError`] or plain I/O errors
//! in the binary; per-unit failures are [`DeployError`]/[`StartError`] and
//! never escape the deployment pipeline; per-request faults are handled at
//! the dispatch boundary and never materialize as error values above it.

use std::path::PathBuf;

/// Host configuration could not be loaded. Fatal at start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One application failed to reach Running. Contained per unit.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("manifest not found at {0}")]
    MissingManifest(PathBuf),
    #[error("invalid manifest {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("route pattern {0:?} is invalid")]
    InvalidRoute(String),
    #[error("action handler {0:?} is not resolvable")]
    UnresolvedHandler(String),
    #[error("action handler {name:?} failed to initialize: {message}")]
    HandlerInit { name: String, message: String },
    #[error("interceptor {0:?} is not resolvable")]
    UnresolvedInterceptor(String),
}

/// A deployment step failed for one bundle or directory. Contained per unit.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to extract bundle {bundle}: {source}")]
    Extract {
        bundle: String,
        #[source]
        source: std::io::Error,
    },
    #[error("application {app} failed to start: {source}")]
    Start {
        app: String,
        #[source]
        source: StartError,
    },
    #[error("application {0} panicked during start")]
    StartPanic(String),
}
