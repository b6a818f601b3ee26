//! Built-in handlers and interceptors available to every application.
//!
//! These populate the host's shared table; an application resolves them by
//! name unless it registers its own implementation under the same name
//! (child-first resolution).

use crate::dispatch::{Flow, HandlerRequest, Interceptor, Response};
use crate::loader::HandlerTable;
use std::sync::Arc;
use tracing::info;

/// Echo the request back as JSON. Handy for smoke tests and as the default
/// target of freshly scaffolded applications.
pub fn echo(req: &HandlerRequest, res: &mut Response) -> anyhow::Result<()> {
    let params: Vec<(&str, &str)> = req
        .path_params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_str()))
        .collect();
    let query: Vec<(&str, &str)> = req
        .query_params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_str()))
        .collect();
    res.write_json(&serde_json::json!({
        "app": req.app.as_ref(),
        "method": req.method.to_string(),
        "path": req.path,
        "params": params,
        "query": query,
        "body": req.body,
    }));
    Ok(())
}

/// Log one line per intercepted request.
pub struct RequestLog;

impl Interceptor for RequestLog {
    fn before(&self, req: &HandlerRequest, _res: &mut Response) -> Flow {
        info!(
            app = %req.app,
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            recent_session = req.session.is_recent(),
            "request"
        );
        Flow::Continue
    }
}

/// Reject requests missing a fixed bearer token in `authorization`.
pub struct RequireHeaderToken {
    token: String,
}

impl RequireHeaderToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Interceptor for RequireHeaderToken {
    fn before(&self, req: &HandlerRequest, res: &mut Response) -> Flow {
        match req.get_header("authorization") {
            Some(value) if value == self.token => Flow::Continue,
            _ => {
                res.fail(401, "Unauthorized");
                Flow::Halt
            }
        }
    }
}

/// The shared table every application loader falls back to.
pub fn shared_table() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.register_handler("echo", Arc::new(echo));
    table.register_interceptor("request_log", Arc::new(RequestLog));
    table
}
