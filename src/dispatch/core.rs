//! Request and response types shared by the dispatch path.
//!
//! A [`HandlerRequest`] is built once per decoded HTTP request and handed to
//! the owning application's worker pool; the pooled [`Response`] travels with
//! it, is written by interceptors and the action handler, and is encoded and
//! recycled by the server after the worker replies.

use crate::ids::RequestId;
use crate::pool::Recyclable;
use crate::session::Session;
use http::Method;
use may::sync::mpsc;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Maximum inline headers/cookies before heap allocation.
/// Most requests have ≤16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Maximum inline path/query parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated header/cookie storage for the hot path.
///
/// Header names use `Arc<str>` because they repeat across requests
/// (Content-Type, Host, Cookie, ...) and `Arc::clone` is an atomic bump
/// rather than a copy; values are per-request data and stay `String`.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Stack-allocated parameter storage for the hot path.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// One decoded HTTP request, bound to the application that will handle it.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// Unique request id for log correlation
    pub request_id: RequestId,
    /// Name of the owning application
    pub app: Arc<str>,
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Parameters extracted from the matched route pattern
    pub path_params: ParamVec,
    pub query_params: ParamVec,
    /// Headers with lowercase names
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    /// Body parsed as JSON when it was valid JSON
    pub body: Option<Value>,
    /// Session resolved for this request
    pub session: Arc<Session>,
    /// Client address as resolved by the server (may be empty when no
    /// trusted source for it exists)
    pub remote_addr: String,
}

impl HandlerRequest {
    /// Path parameter by name, last occurrence wins for duplicate names.
    #[inline]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter by name, last occurrence wins.
    #[inline]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header by name, case-insensitive per RFC 7230.
    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Cookie by name.
    #[inline]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Pooled response object.
///
/// Acquired from the host's [`crate::pool::Pool`] when dispatch starts,
/// bound to the owning application and session, filled by application logic,
/// flushed to the wire by the server, then recycled. Never retained past
/// response completion.
#[derive(Debug, Default)]
pub struct Response {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    app: Option<Arc<str>>,
    file: Option<PathBuf>,
    session: Option<Arc<Session>>,
}

impl Response {
    /// Status code; 200 unless set.
    pub fn status(&self) -> u16 {
        if self.status == 0 {
            200
        } else {
            self.status
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Set a header. Keys are unique; a repeated set overwrites.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_string(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append bytes to the output buffer.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Serialize a JSON value into the output buffer and mark the content
    /// type, replacing anything previously written.
    pub fn write_json(&mut self, value: &Value) {
        self.body.clear();
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.body = bytes;
        }
        self.set_header("Content-Type", "application/json");
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Point the response at a static file instead of the buffer.
    pub fn set_file(&mut self, path: PathBuf) {
        self.file = Some(path);
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.file.as_ref()
    }

    pub fn bind_app(&mut self, app: Arc<str>) {
        self.app = Some(app);
    }

    pub fn app(&self) -> Option<&Arc<str>> {
        self.app.as_ref()
    }

    pub fn bind_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Replace whatever has been written so far with a JSON error body.
    /// Used at dispatch boundaries; a fault must not leak a half-written
    /// payload.
    pub fn fail(&mut self, status: u16, message: &str) {
        self.status = status;
        self.file = None;
        self.write_json(&serde_json::json!({ "error": message }));
    }
}

impl Recyclable for Response {
    fn recycle(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.body.clear();
        self.app = None;
        self.file = None;
        self.session = None;
    }
}

/// Interceptor outcome: continue down the chain or stop here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Skip the remaining chain and the action handler; the interceptor has
    /// written the response.
    Halt,
}

/// Pre-processing step run before an action handler, in declared order.
pub trait Interceptor: Send + Sync {
    fn before(&self, req: &HandlerRequest, res: &mut Response) -> Flow;
}

/// One application entry point.
///
/// Errors returned from `handle` are mapped to a 500 at the dispatch
/// boundary; they never unwind past the owning application.
pub trait ActionHandler: Send + Sync {
    /// Called once while the owning application starts. An error or panic
    /// here fails that one application's deployment, nothing else.
    fn init(&self, _app: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn handle(&self, req: &HandlerRequest, res: &mut Response) -> anyhow::Result<()>;
}

impl<F> ActionHandler for F
where
    F: Fn(&HandlerRequest, &mut Response) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, req: &HandlerRequest, res: &mut Response) -> anyhow::Result<()> {
        self(req, res)
    }
}

/// A dispatch unit queued to an application's worker pool.
pub struct DispatchJob {
    pub route: Arc<super::table::ActionRoute>,
    pub request: HandlerRequest,
    pub response: Response,
    /// One-shot reply carrying the written response back to the connection
    /// coroutine
    pub reply_tx: mpsc::Sender<Response>,
}

/// Run the interceptor chain, then the handler.
///
/// Interceptors run in declared order; a `Halt` skips the rest of the chain
/// and the handler itself.
pub fn execute(
    route: &super::table::ActionRoute,
    req: &HandlerRequest,
    res: &mut Response,
) -> anyhow::Result<()> {
    for interceptor in route.interceptors() {
        if interceptor.before(req, res) == Flow::Halt {
            return Ok(());
        }
    }
    route.handler().handle(req, res)
}
