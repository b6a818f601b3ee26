//! Per-application dispatch table.
//!
//! Routes are matched in declared order; tables are per-application and
//! small, so a linear scan over compiled patterns wins over anything
//! cleverer.

use super::core::{ActionHandler, Interceptor, ParamVec};
use crate::error::StartError;
use http::Method;
use regex::Regex;
use std::sync::Arc;

/// One declared action: route pattern, handler, interceptor chain.
pub struct ActionRoute {
    method: Method,
    pattern: String,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    handler_name: String,
    handler: Arc<dyn ActionHandler>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    content_type: String,
}

impl ActionRoute {
    pub fn new(
        method: Method,
        pattern: &str,
        handler_name: &str,
        handler: Arc<dyn ActionHandler>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        content_type: String,
    ) -> Result<Self, StartError> {
        let (regex, param_names) = compile_pattern(pattern)?;
        Ok(Self {
            method,
            pattern: pattern.to_string(),
            regex,
            param_names,
            handler_name: handler_name.to_string(),
            handler,
            interceptors,
            content_type,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Ordered route table consulted once per request.
#[derive(Default)]
pub struct DispatchTable {
    routes: Vec<Arc<ActionRoute>>,
}

impl DispatchTable {
    pub fn new(routes: Vec<Arc<ActionRoute>>) -> Self {
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route (in declared order) matching method and path, with the
    /// extracted path parameters.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<(Arc<ActionRoute>, ParamVec)> {
        for route in &self.routes {
            if route.method != *method {
                continue;
            }
            if let Some(caps) = route.regex.captures(path) {
                let mut params = ParamVec::new();
                for (i, name) in route.param_names.iter().enumerate() {
                    if let Some(m) = caps.get(i + 1) {
                        params.push((Arc::clone(name), m.as_str().to_string()));
                    }
                }
                return Some((Arc::clone(route), params));
            }
        }
        None
    }
}

/// Compile a `/users/{id}`-style pattern into a regex plus the ordered
/// parameter names.
fn compile_pattern(pattern: &str) -> Result<(Regex, Vec<Arc<str>>), StartError> {
    if !pattern.starts_with('/') {
        return Err(StartError::InvalidRoute(pattern.to_string()));
    }
    if pattern == "/" {
        let regex =
            Regex::new(r"^/$").map_err(|_| StartError::InvalidRoute(pattern.to_string()))?;
        return Ok((regex, Vec::new()));
    }

    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    let mut param_names = Vec::new();
    for segment in pattern.split('/') {
        if segment.is_empty() {
            continue;
        }
        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            if name.is_empty() {
                return Err(StartError::InvalidRoute(pattern.to_string()));
            }
            expr.push_str("/([^/]+)");
            param_names.push(Arc::from(name));
        } else {
            expr.push('/');
            expr.push_str(&regex::escape(segment));
        }
    }
    expr.push('$');
    let regex = Regex::new(&expr).map_err(|_| StartError::InvalidRoute(pattern.to_string()))?;
    Ok((regex, param_names))
}
