//! The host's HTTP service: one `call` per decoded request.
//!
//! Connection accept/decode/encode belongs to the codec's I/O coroutines;
//! this service only resolves the tenant, resolves the session, and hands
//! off to the application's worker pool. A registry miss is answered with a
//! fixed 404 that touches no application state: no session is created, no
//! application code runs.

use crate::app::AppRegistry;
use crate::dispatch::{HandlerRequest, ParamVec, Response};
use crate::ids::RequestId;
use crate::pool::Pool;
use crate::server::request::parse_request;
use crate::server::response::{encode, write_json_error};
use http::Method;
use may_minihttp::{HttpService, Request, Response as HttpResponse};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct HostService {
    pub registry: Arc<AppRegistry>,
    pub responses: Arc<Pool<Response>>,
    /// Trust `X-Forwarded-For` for client addresses
    pub trusted_proxy: bool,
}

/// Host-level liveness endpoint, answered before tenant lookup.
fn health_endpoint(res: &mut HttpResponse) {
    res.status_code(200, "OK");
    res.header("Content-Type: application/json");
    res.body_vec(br#"{"status":"ok"}"#.to_vec());
}

impl HttpService for HostService {
    fn call(&mut self, req: Request, res: &mut HttpResponse) -> io::Result<()> {
        let parsed = parse_request(req);

        if parsed.method == Method::GET && parsed.path == "/health" {
            health_endpoint(res);
            return Ok(());
        }

        let Some(host) = parsed.host_key() else {
            write_json_error(res, 400, json!({ "error": "missing Host header" }));
            return Ok(());
        };
        let Some(app) = self.registry.lookup(&host) else {
            write_json_error(
                res,
                404,
                json!({ "error": "no such application", "host": host }),
            );
            return Ok(());
        };

        let remote_addr = parsed.remote_addr(self.trusted_proxy);
        let session = app.sessions().resolve(parsed.session_token(), &remote_addr);

        let mut response = self.responses.acquire();
        response.bind_app(Arc::clone(app.name()));
        response.bind_session(Arc::clone(&session));

        let request = HandlerRequest {
            request_id: RequestId::new(),
            app: Arc::clone(app.name()),
            method: parsed.method,
            path: parsed.path,
            path_params: ParamVec::new(),
            query_params: parsed.query_params,
            headers: parsed.headers,
            cookies: parsed.cookies,
            body: parsed.body,
            session,
            remote_addr,
        };
        let method = request.method.clone();
        let path = request.path.clone();

        let response = app.dispatch(request, response);
        encode(res, &response);

        info!(
            app = %app.name(),
            method = %method,
            path = %path,
            status = response.status(),
            "request complete"
        );

        // Recycled on every path; never retained past this point.
        self.responses.release(response);
        Ok(())
    }
}
