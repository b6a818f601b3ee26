//! One deployed application.
//!
//! An [`Application`] is built by the deployment pipeline, taken through
//! Stopped → Starting → Running by its start procedure, and only then
//! published (read-only, behind `Arc`) to the registry. Its start procedure
//! reads the manifest, builds the application's isolated loader, resolves
//! every declared handler and interceptor through it, compiles the dispatch
//! table and spawns the worker pool. Any failure leaves the unit Failed and
//! never escapes the pipeline.

use crate::dispatch::{ActionRoute, DispatchJob, DispatchTable, HandlerRequest, Response};
use crate::error::StartError;
use crate::loader::{AppLoader, HandlerTable};
use crate::manifest::{AppManifest, DEFAULT_CONTENT_TYPE};
use crate::pool::Pool;
use crate::session::{Session, SessionManager};
use crate::static_files::content_type_for;
use crate::worker_pool::{DispatchOutcome, WorkerPool, WorkerPoolConfig};
use http::Method;
use may::sync::mpsc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};

/// Lifecycle of one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Shared construction inputs handed to every unit by the pipeline.
pub struct DeployContext {
    /// Host-provided handlers/interceptors, the loader's second tier
    pub shared: Arc<HandlerTable>,
    /// Host-wide resource directory, searched after the app's own roots
    pub shared_resources: Option<PathBuf>,
    pub worker: WorkerPoolConfig,
    pub sessions: Arc<Pool<Session>>,
    pub responses: Arc<Pool<Response>>,
}

pub struct Application {
    name: Arc<str>,
    root: PathBuf,
    state: Mutex<LifecycleState>,
    host_key: String,
    loader: Option<AppLoader>,
    table: Arc<DispatchTable>,
    sessions: SessionManager,
    workers: Mutex<Option<WorkerPool>>,
    responses: Arc<Pool<Response>>,
}

impl Application {
    /// A unit in Stopped state; identity comes from the directory name.
    pub fn new(root: &Path, ctx: &DeployContext) -> Self {
        let name: Arc<str> = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app")
            .into();
        Self {
            host_key: name.to_ascii_lowercase(),
            name,
            root: root.to_path_buf(),
            state: Mutex::new(LifecycleState::Stopped),
            loader: None,
            table: Arc::new(DispatchTable::default()),
            sessions: SessionManager::new(
                Duration::from_secs(30 * 60),
                Arc::clone(&ctx.sessions),
            ),
            workers: Mutex::new(None),
            responses: Arc::clone(&ctx.responses),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Routing key this unit is registered under.
    pub fn host_key(&self) -> &str {
        &self.host_key
    }

    pub fn state(&self) -> LifecycleState {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark(&self, state: LifecycleState) {
        *self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.table
    }

    /// Bring the unit to Running.
    ///
    /// `own` is this application's private handler table; names resolve
    /// there before the host's shared table.
    pub fn start(&mut self, ctx: &DeployContext, own: HandlerTable) -> Result<(), StartError> {
        self.mark(LifecycleState::Starting);
        info!(app = %self.name, root = %self.root.display(), "starting application");

        let manifest = AppManifest::load(&self.root)?;
        if let Some(host) = &manifest.host {
            self.host_key = host.to_ascii_lowercase();
        }

        let resource_roots: Vec<PathBuf> = manifest
            .resources
            .iter()
            .map(|r| self.root.join(r))
            .collect();
        let loader = AppLoader::new(
            own,
            Arc::clone(&ctx.shared),
            resource_roots,
            ctx.shared_resources.clone(),
        );

        let mut routes = Vec::with_capacity(manifest.actions.len());
        let mut initialized: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for action in &manifest.actions {
            let method: Method = action
                .method
                .parse()
                .map_err(|_| StartError::InvalidRoute(format!("{} {}", action.method, action.route)))?;
            let handler = loader
                .handler(&action.handler)
                .ok_or_else(|| StartError::UnresolvedHandler(action.handler.clone()))?;
            if initialized.insert(action.handler.as_str()) {
                handler
                    .init(&self.name)
                    .map_err(|e| StartError::HandlerInit {
                        name: action.handler.clone(),
                        message: e.to_string(),
                    })?;
            }
            let mut chain = Vec::with_capacity(action.interceptors.len());
            for name in &action.interceptors {
                chain.push(
                    loader
                        .interceptor(name)
                        .ok_or_else(|| StartError::UnresolvedInterceptor(name.clone()))?,
                );
            }
            let content_type = action
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            routes.push(Arc::new(ActionRoute::new(
                method,
                &action.route,
                &action.handler,
                handler,
                chain,
                content_type,
            )?));
        }

        self.table = Arc::new(DispatchTable::new(routes));
        self.loader = Some(loader);
        self.sessions = SessionManager::new(
            Duration::from_secs(manifest.session.expiration_minutes * 60),
            Arc::clone(&ctx.sessions),
        );
        // SAFETY: worker spawn requires the may runtime, which is live for
        // the whole host process.
        let pool = unsafe { WorkerPool::spawn(Arc::clone(&self.name), ctx.worker) };
        *self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(pool);

        self.mark(LifecycleState::Running);
        info!(
            app = %self.name,
            host = %self.host_key,
            actions = self.table.len(),
            "application running"
        );
        Ok(())
    }

    /// Stop the unit: drain sessions, retire the worker pool.
    ///
    /// Dropping the pool closes the job queue and lets the worker
    /// coroutines exit on their own; in-flight jobs still complete.
    pub fn stop(&self) {
        let pool = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(pool);
        self.sessions.drain();
        self.mark(LifecycleState::Stopped);
        info!(app = %self.name, "application stopped");
    }

    /// Expire stale sessions with this unit's configured TTL.
    pub fn sweep_sessions(&self, now: SystemTime) -> usize {
        self.sessions.sweep(now)
    }

    /// Dispatch one decoded request into this application.
    ///
    /// Table hit: the job is queued to the worker pool and the written
    /// response comes back over the job's reply channel. Table miss: GET
    /// and HEAD fall back to the application's static resources; anything
    /// else is the application's 404. Every path returns a response for
    /// the server to encode and recycle.
    pub fn dispatch(&self, mut req: HandlerRequest, mut res: Response) -> Response {
        if let Some((route, params)) = self.table.resolve(&req.method, &req.path) {
            req.path_params = params;
            res.set_header("Content-Type", route.content_type());

            let (reply_tx, reply_rx) = mpsc::channel();
            let job = DispatchJob {
                route,
                request: req,
                response: res,
                reply_tx,
            };

            let outcome = {
                let guard = self
                    .workers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match guard.as_ref() {
                    Some(pool) => pool.dispatch(job),
                    None => DispatchOutcome::Saturated(job),
                }
            };

            return match outcome {
                DispatchOutcome::Queued => match reply_rx.recv() {
                    Ok(response) => response,
                    Err(_) => {
                        error!(app = %self.name, "reply channel closed before response");
                        let mut fallback = self.responses.acquire();
                        fallback.bind_app(Arc::clone(&self.name));
                        fallback.fail(503, "Service Unavailable");
                        fallback
                    }
                },
                DispatchOutcome::Saturated(job) => {
                    warn!(app = %self.name, "worker pool saturated, shedding request");
                    let mut response = job.response;
                    response.fail(503, "Service Unavailable");
                    response
                }
                DispatchOutcome::Closed => {
                    let mut fallback = self.responses.acquire();
                    fallback.bind_app(Arc::clone(&self.name));
                    fallback.fail(503, "Service Unavailable");
                    fallback
                }
            };
        }

        if req.method == Method::GET || req.method == Method::HEAD {
            if let Some(loader) = &self.loader {
                let name = req.path.trim_start_matches('/');
                let name = if name.is_empty() { "index.html" } else { name };
                if let Some(path) = loader.resource(name) {
                    res.set_header("Content-Type", content_type_for(&path));
                    res.set_file(path);
                    return res;
                }
            }
        }

        res.fail(404, "Not Found");
        res
    }
}
