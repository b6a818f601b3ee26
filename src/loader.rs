//! Per-application name resolution.
//!
//! Each deployed application gets its own [`AppLoader`], never shared with
//! any other application. Resolution is child-first: a name defined in the
//! application's own table wins over a same-named entry in the host's
//! shared table, which in turn wins over the optional enclosing resolver.
//! This is the opposite of lexical-scope lookup on purpose: an application
//! may override a host-provided handler for itself without affecting anyone
//! else, while names it never defines fall through to the common stock.
//!
//! Resource lookup follows the same order over directories: the
//! application's declared resource roots first, the host's shared resource
//! directory second.
//!
//! Every name is resolved at most once per loader. The memo tables are
//! monotonic: once a name has resolved to something, the same loader
//! returns the same result for that name forever.

use crate::dispatch::{ActionHandler, Interceptor};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Named handler and interceptor implementations.
///
/// One table holds an application's own registrations; another, host-wide
/// one holds the built-ins and anything the embedder shares with every
/// application.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    interceptors: HashMap<String, Arc<dyn Interceptor>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, name: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn register_interceptor(&mut self, name: &str, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.insert(name.to_string(), interceptor);
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).map(Arc::clone)
    }

    pub fn interceptor(&self, name: &str) -> Option<Arc<dyn Interceptor>> {
        self.interceptors.get(name).map(Arc::clone)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.interceptors.is_empty()
    }
}

/// Child-first resolver for one application.
pub struct AppLoader {
    own: HandlerTable,
    shared: Arc<HandlerTable>,
    parent: Option<Arc<HandlerTable>>,
    resource_roots: Vec<PathBuf>,
    shared_resources: Option<PathBuf>,
    handler_memo: DashMap<String, Arc<dyn ActionHandler>>,
    interceptor_memo: DashMap<String, Arc<dyn Interceptor>>,
    resource_memo: DashMap<String, PathBuf>,
}

impl AppLoader {
    pub fn new(
        own: HandlerTable,
        shared: Arc<HandlerTable>,
        resource_roots: Vec<PathBuf>,
        shared_resources: Option<PathBuf>,
    ) -> Self {
        Self {
            own,
            shared,
            parent: None,
            resource_roots,
            shared_resources,
            handler_memo: DashMap::new(),
            interceptor_memo: DashMap::new(),
            resource_memo: DashMap::new(),
        }
    }

    /// Attach an enclosing resolver consulted after the shared table.
    pub fn with_parent(mut self, parent: Arc<HandlerTable>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Resolve an action handler, child table first.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        if let Some(hit) = self.handler_memo.get(name) {
            return Some(Arc::clone(&hit));
        }
        let resolved = self
            .own
            .handler(name)
            .or_else(|| self.shared.handler(name))
            .or_else(|| self.parent.as_ref().and_then(|p| p.handler(name)))?;
        let entry = self
            .handler_memo
            .entry(name.to_string())
            .or_insert(resolved);
        Some(Arc::clone(&entry))
    }

    /// Resolve an interceptor, child table first.
    pub fn interceptor(&self, name: &str) -> Option<Arc<dyn Interceptor>> {
        if let Some(hit) = self.interceptor_memo.get(name) {
            return Some(Arc::clone(&hit));
        }
        let resolved = self
            .own
            .interceptor(name)
            .or_else(|| self.shared.interceptor(name))
            .or_else(|| self.parent.as_ref().and_then(|p| p.interceptor(name)))?;
        let entry = self
            .interceptor_memo
            .entry(name.to_string())
            .or_insert(resolved);
        Some(Arc::clone(&entry))
    }

    /// Resolve a resource name to a file on disk, application roots first.
    ///
    /// Names are URL-path-like (`css/site.css`); anything that would escape
    /// a root is rejected outright.
    pub fn resource(&self, name: &str) -> Option<PathBuf> {
        if let Some(hit) = self.resource_memo.get(name) {
            return Some(hit.clone());
        }
        let rel = sanitize(name)?;
        let found = self
            .resource_roots
            .iter()
            .chain(self.shared_resources.iter())
            .map(|root| root.join(&rel))
            .find(|candidate| candidate.is_file())?;
        let entry = self.resource_memo.entry(name.to_string()).or_insert(found);
        Some(entry.clone())
    }
}

/// Turn a URL-ish path into a safe relative path, refusing traversal.
fn sanitize(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in Path::new(name.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => out.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{HandlerRequest, Response};

    fn handler(tag: &'static str) -> Arc<dyn ActionHandler> {
        Arc::new(move |_: &HandlerRequest, res: &mut Response| {
            res.write(tag.as_bytes());
            Ok(())
        })
    }

    #[test]
    fn test_child_wins_over_shared() {
        let mut shared = HandlerTable::new();
        shared.register_handler("greet", handler("shared"));
        let mut own = HandlerTable::new();
        own.register_handler("greet", handler("own"));

        let loader = AppLoader::new(own, Arc::new(shared), Vec::new(), None);
        let resolved = loader.handler("greet").unwrap();
        let mut res = Response::default();
        resolved
            .handle(&crate::test_support::dummy_request(), &mut res)
            .unwrap();
        assert_eq!(res.body(), b"own");
    }

    #[test]
    fn test_falls_back_to_shared_then_parent() {
        let mut shared = HandlerTable::new();
        shared.register_handler("greet", handler("shared"));
        let mut parent = HandlerTable::new();
        parent.register_handler("legacy", handler("parent"));

        let loader = AppLoader::new(HandlerTable::new(), Arc::new(shared), Vec::new(), None)
            .with_parent(Arc::new(parent));
        assert!(loader.handler("greet").is_some());
        assert!(loader.handler("legacy").is_some());
        assert!(loader.handler("missing").is_none());
    }

    #[test]
    fn test_resolution_is_memoized() {
        let mut shared = HandlerTable::new();
        shared.register_handler("greet", handler("shared"));
        let loader = AppLoader::new(HandlerTable::new(), Arc::new(shared), Vec::new(), None);

        let first = loader.handler("greet").unwrap();
        let second = loader.handler("greet").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_sanitize_refuses_traversal() {
        assert!(sanitize("../secrets").is_none());
        assert!(sanitize("/etc/../../passwd").is_none());
        assert_eq!(sanitize("/css/site.css"), Some(PathBuf::from("css/site.css")));
        assert!(sanitize("").is_none());
    }
}
