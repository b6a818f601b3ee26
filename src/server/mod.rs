//! HTTP front end: request decoding, tenant resolution, response encoding.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{normalize_host, parse_request, ParsedRequest, SESSION_COOKIE};
pub use response::{encode, write_json_error};
pub use service::HostService;
