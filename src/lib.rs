//! # Tenement
//!
//! **Tenement** is a multi-tenant HTTP application host built on the `may`
//! coroutine runtime and `may_minihttp`. One process serves many
//! independently deployed, independently lifecycled applications: each
//! request is routed by its Host header to the owning application and
//! dispatched into that application's isolated runtime.
//!
//! ## Architecture
//!
//! - **[`deploy`]**: one scan per host start: packed `.tar` bundles under
//!   the applications directory are unpacked in place, every subdirectory
//!   becomes a deployment candidate, and a failing application is logged
//!   and excluded without taking the host down.
//! - **[`loader`]**: per-application child-first name resolution: the
//!   application's own handler/interceptor/resource entries win over the
//!   host's shared ones, and resolution is memoized per loader. Two
//!   applications can never see each other's private entries.
//! - **[`app`]**: the application unit (lifecycle, manifest-driven
//!   dispatch table, per-unit worker pool, per-unit session store) and the
//!   concurrently-readable registry mapping routing keys to running units.
//! - **[`dispatch`]**: the request/response types and the interceptor
//!   chain contract; [`worker_pool`] keeps application logic off the
//!   connection coroutines and contains its faults.
//! - **[`pool`]**: reset-on-return caching of response and session
//!   objects to bound allocation churn under load.
//! - **[`session`]**: per-application session stores with address-bound
//!   tokens and TTL sweeping.
//! - **[`server`]**: the `may_minihttp` front end: decode, tenant lookup,
//!   session resolve, dispatch hand-off, encode.
//! - **[`host`]**: the explicit lifecycle object tying it all together,
//!   including graceful shutdown of every registered application.
//!
//! ## Fault containment
//!
//! Faults never cross an application boundary. A bad bundle or a panicking
//! start procedure costs exactly one application; a panicking handler costs
//! exactly one request (mapped to a 500 and logged with the owning
//! application's identity). Only three conditions are fatal at start:
//! missing applications directory, unreadable host configuration, and a
//! listener that cannot bind.
//!
//! ## Quick start
//!
//! ```no_run
//! use tenement::config::HostConfig;
//! use tenement::host::Host;
//! use std::path::Path;
//!
//! let mut host = Host::new(Path::new("/srv/tenement"), HostConfig::default());
//! host.deploy().expect("applications directory missing");
//! let handle = host.start().expect("bind failed");
//! handle.join().ok();
//! ```

pub mod app;
pub mod builtin;
pub mod config;
pub mod deploy;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod ids;
pub mod loader;
pub mod manifest;
pub mod pool;
pub mod server;
pub mod session;
pub mod static_files;
pub mod worker_pool;

pub use app::{AppRegistry, Application, DeployContext, LifecycleState};
pub use dispatch::{ActionHandler, Flow, HandlerRequest, Interceptor, Response};
pub use error::{ConfigError, DeployError, StartError};
pub use host::Host;
pub use loader::{AppLoader, HandlerTable};
pub use pool::{Pool, Recyclable};
pub use session::{Session, SessionManager};
