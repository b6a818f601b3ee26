//! Process-wide registry of running applications.
//!
//! Read-mostly: every request-handling coroutine does a lookup, inserts
//! happen only during deployment. Units are registered only after their
//! start procedure completed, so a reader can never observe a partially
//! constructed application.

use super::application::Application;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

#[derive(Default)]
pub struct AppRegistry {
    by_host: DashMap<String, Arc<Application>>,
    /// Registration order, used for shutdown iteration
    order: Mutex<Vec<Arc<Application>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a running unit under its routing key. Last write wins on a
    /// key collision. Two deployed applications claiming the same host is
    /// a configuration smell worth a warning, not a failure.
    pub fn register(&self, app: Arc<Application>) {
        let key = app.host_key().to_string();
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&app));
        if let Some(previous) = self.by_host.insert(key.clone(), app) {
            warn!(
                host = %key,
                replaced = %previous.name(),
                "routing key collision, keeping the later registration"
            );
        }
    }

    /// Case-insensitive lookup by routing key.
    pub fn lookup(&self, key: &str) -> Option<Arc<Application>> {
        self.by_host
            .get(&key.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered unit, in registration order.
    pub fn all(&self) -> Vec<Arc<Application>> {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }

    /// Drop every registration. Callers stop the units first.
    pub fn clear(&self) {
        self.by_host.clear();
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
