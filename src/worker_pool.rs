//! Per-application worker pool.
//!
//! Application logic never runs on the connection coroutines. Each running
//! application owns a small pool of worker coroutines fed from a shared
//! queue; the connection side enqueues a [`DispatchJob`] and blocks only on
//! the job's own reply channel. The queue is bounded by in-flight count:
//! when an application is saturated the job is returned to the caller and
//! answered 503 instead of queueing without limit.
//!
//! A panic or error inside an interceptor or handler is caught here, logged
//! with the owning application's identity, and turned into a 500 on the
//! job's own response. It never tears down the worker, the connection, or
//! any other application.

use crate::dispatch::{execute, DispatchJob};
use may::sync::mpsc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Sizing for one application's worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    /// Maximum in-flight jobs before shedding
    pub queue_bound: usize,
    /// Worker coroutine stack size in bytes
    pub stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_bound: 1024,
            stack_size: 0x10000, // 64KB
        }
    }
}

impl From<crate::config::WorkerSettings> for WorkerPoolConfig {
    fn from(s: crate::config::WorkerSettings) -> Self {
        Self {
            workers: s.workers.max(1),
            queue_bound: s.queue_bound.max(1),
            stack_size: s.stack_size,
        }
    }
}

/// Counters for monitoring one pool.
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    queue_depth: AtomicUsize,
    dispatched: AtomicU64,
    completed: AtomicU64,
    shed: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn shed(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }

    fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_shed(&self) {
        self.shed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of queueing a job.
pub enum DispatchOutcome {
    /// Job accepted; the reply arrives on the job's channel.
    Queued,
    /// In-flight bound reached; the job (and its pooled response) comes
    /// back untouched.
    Saturated(DispatchJob),
    /// Workers are gone (application stopped mid-flight). The job is lost.
    Closed,
}

/// A pool of worker coroutines sharing one job queue.
pub struct WorkerPool {
    app: Arc<str>,
    config: WorkerPoolConfig,
    sender: mpsc::Sender<DispatchJob>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl WorkerPool {
    /// Spawn the worker coroutines for one application.
    ///
    /// # Safety
    ///
    /// `may::coroutine::Builder::spawn` is unsafe in the `may` runtime; the
    /// caller must ensure the runtime is initialized before any jobs are
    /// dispatched. Workers exit when the pool (and with it the queue
    /// sender) is dropped.
    pub unsafe fn spawn(app: Arc<str>, config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<DispatchJob>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::default());

        info!(
            app = %app,
            workers = config.workers,
            queue_bound = config.queue_bound,
            stack_size = config.stack_size,
            "starting worker pool"
        );

        for worker_id in 0..config.workers {
            let rx = Arc::clone(&rx);
            let app = Arc::clone(&app);
            let metrics = Arc::clone(&metrics);

            // SAFETY: spawn is unsafe per the may runtime contract; the
            // closure is Send + 'static and owns everything it touches.
            let spawned = unsafe {
                may::coroutine::Builder::new()
                    .stack_size(config.stack_size)
                    .spawn(move || {
                        debug!(app = %app, worker_id, "worker started");
                        while let Ok(job) = rx.recv() {
                            run_job(&app, worker_id, job);
                            metrics.record_completion();
                        }
                        debug!(app = %app, worker_id, "worker exiting");
                    })
            };
            if let Err(e) = spawned {
                error!(app = %app, worker_id, error = %e, "failed to spawn worker coroutine");
            }
        }

        Self {
            app,
            config,
            sender: tx,
            metrics,
        }
    }

    /// Queue a job, enforcing the in-flight bound.
    pub fn dispatch(&self, job: DispatchJob) -> DispatchOutcome {
        if self.metrics.queue_depth() >= self.config.queue_bound {
            self.metrics.record_shed();
            return DispatchOutcome::Saturated(job);
        }
        self.metrics.record_dispatch();
        match self.sender.send(job) {
            Ok(()) => DispatchOutcome::Queued,
            Err(_) => {
                // Workers already exited; rebalance the depth counter.
                self.metrics.record_completion();
                error!(app = %self.app, "worker queue disconnected");
                DispatchOutcome::Closed
            }
        }
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

/// Run one job with fault containment and reply on its channel.
fn run_job(app: &Arc<str>, worker_id: usize, job: DispatchJob) {
    let DispatchJob {
        route,
        request,
        mut response,
        reply_tx,
    } = job;
    let request_id = request.request_id;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        execute(&route, &request, &mut response)
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(
                app = %app,
                request_id = %request_id,
                handler = route.handler_name(),
                error = %e,
                "handler returned error"
            );
            response.fail(500, "Internal Server Error");
        }
        Err(panic) => {
            error!(
                app = %app,
                request_id = %request_id,
                worker_id,
                handler = route.handler_name(),
                panic = ?panic,
                "handler panicked"
            );
            response.fail(500, "Internal Server Error");
        }
    }

    // The connection side may have given up; a closed reply channel only
    // means the response is discarded.
    let _ = reply_tx.send(response);
}
