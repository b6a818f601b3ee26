//! Host lifecycle.
//!
//! The [`Host`] owns everything process-wide: configuration, the shared
//! handler table, the application registry, the response/session pools and
//! the session sweeper thread. It is driven explicitly (configure,
//! `deploy()`, `start()`, and eventually `shutdown()` from the process's
//! signal handling) rather than through implicit global registration.

use crate::app::{AppRegistry, DeployContext};
use crate::builtin;
use crate::config::HostConfig;
use crate::deploy::deploy_all;
use crate::dispatch::{ActionHandler, Interceptor, Response};
use crate::error::ConfigError;
use crate::loader::HandlerTable;
use crate::pool::Pool;
use crate::server::{HostService, HttpServer, ServerHandle};
use crate::session::Session;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

/// Subdirectory scanned for bundles and application roots.
pub const APPS_DIRNAME: &str = "apps";
/// Subdirectory of host-wide shared resources.
pub const SHARED_DIRNAME: &str = "shared";

struct Sweeper {
    stop: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

pub struct Host {
    config: HostConfig,
    base_dir: PathBuf,
    registry: Arc<AppRegistry>,
    shared: HandlerTable,
    app_tables: HashMap<String, HandlerTable>,
    sessions: Arc<Pool<Session>>,
    responses: Arc<Pool<Response>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl Host {
    pub fn new(base_dir: &Path, config: HostConfig) -> Self {
        Self {
            config,
            base_dir: base_dir.to_path_buf(),
            registry: Arc::new(AppRegistry::new()),
            shared: builtin::shared_table(),
            app_tables: HashMap::new(),
            sessions: Arc::new(Pool::new()),
            responses: Arc::new(Pool::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Build a host from `host.yaml` in the base directory plus environment
    /// overrides. An unreadable configuration is fatal to the caller.
    pub fn from_dir(base_dir: &Path) -> Result<Self, ConfigError> {
        let config = HostConfig::load(base_dir)?;
        Ok(Self::new(base_dir, config))
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.base_dir.join(APPS_DIRNAME)
    }

    /// Share a handler with every application (loader second tier).
    pub fn register_shared_handler(&mut self, name: &str, handler: Arc<dyn ActionHandler>) {
        self.shared.register_handler(name, handler);
    }

    pub fn register_shared_interceptor(&mut self, name: &str, interceptor: Arc<dyn Interceptor>) {
        self.shared.register_interceptor(name, interceptor);
    }

    /// Register a handler private to one application (loader first tier).
    /// Takes effect for the named application at its next deploy.
    pub fn register_app_handler(&mut self, app: &str, name: &str, handler: Arc<dyn ActionHandler>) {
        self.app_tables
            .entry(app.to_string())
            .or_default()
            .register_handler(name, handler);
    }

    pub fn register_app_interceptor(
        &mut self,
        app: &str,
        name: &str,
        interceptor: Arc<dyn Interceptor>,
    ) {
        self.app_tables
            .entry(app.to_string())
            .or_default()
            .register_interceptor(name, interceptor);
    }

    /// Run the deployment pipeline once over the applications directory.
    ///
    /// A missing applications directory is an error; without it the host
    /// has nothing to serve and the binary treats this as fatal. Individual
    /// failing applications are contained inside the pipeline.
    pub fn deploy(&mut self) -> io::Result<usize> {
        let apps_dir = self.apps_dir();
        if !apps_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("applications directory {} does not exist", apps_dir.display()),
            ));
        }
        let shared_resources = {
            let dir = self.base_dir.join(SHARED_DIRNAME);
            dir.is_dir().then_some(dir)
        };
        let ctx = DeployContext {
            shared: Arc::new(std::mem::take(&mut self.shared)),
            shared_resources,
            worker: self.config.worker.into(),
            sessions: Arc::clone(&self.sessions),
            responses: Arc::clone(&self.responses),
        };
        deploy_all(&apps_dir, &self.registry, &ctx, &mut self.app_tables)
    }

    /// The service handed to the HTTP codec. Cheap to clone per I/O
    /// coroutine.
    pub fn service(&self) -> HostService {
        HostService {
            registry: Arc::clone(&self.registry),
            responses: Arc::clone(&self.responses),
            trusted_proxy: self.config.trusted_proxy,
        }
    }

    /// Bind the listener and start the session sweeper.
    pub fn start(&self) -> io::Result<ServerHandle> {
        let handle = HttpServer(self.service()).start(self.config.listen_addr())?;
        self.start_sweeper();
        info!(
            addr = %self.config.listen_addr(),
            apps = self.registry.len(),
            "host serving"
        );
        Ok(handle)
    }

    fn start_sweeper(&self) {
        let interval = self.config.sweep_interval_secs.max(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let registry = Arc::clone(&self.registry);

        let handle = std::thread::Builder::new()
            .name("session-sweeper".to_string())
            .spawn(move || loop {
                for _ in 0..interval {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
                let now = SystemTime::now();
                for app in registry.all() {
                    let removed = app.sweep_sessions(now);
                    if removed > 0 {
                        debug!(app = %app.name(), removed, "expired sessions");
                    }
                }
            });

        match handle {
            Ok(handle) => {
                *self
                    .sweeper
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Sweeper { stop, handle });
            }
            Err(e) => error!(error = %e, "failed to start session sweeper"),
        }
    }

    /// Graceful shutdown: stop the sweeper, then every registered
    /// application in registration order. A unit that misbehaves while
    /// stopping is logged and skipped, never escalated. Idempotent.
    pub fn shutdown(&self) {
        info!("host shutting down");
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.stop.store(true, Ordering::Relaxed);
            let _ = sweeper.handle.join();
        }

        for app in self.registry.all() {
            info!(app = %app.name(), "stopping application");
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| app.stop()));
            if outcome.is_err() {
                error!(app = %app.name(), "application failed to stop cleanly");
            }
        }
        self.registry.clear();
        info!("applications stopped");
    }
}
