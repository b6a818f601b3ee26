//! Decoding of one HTTP request into the host's own types.

use crate::dispatch::{HeaderVec, ParamVec};
use http::Method;
use may_minihttp::Request;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sid";

/// Everything the host needs from a decoded request.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    /// Headers with lowercase names
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    pub query_params: ParamVec,
    /// Body parsed as JSON when it was valid JSON
    pub body: Option<serde_json::Value>,
}

impl ParsedRequest {
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Normalized routing key from the Host header.
    pub fn host_key(&self) -> Option<String> {
        self.get_header("host").map(normalize_host)
    }

    /// Session token presented by the client, if any.
    pub fn session_token(&self) -> Option<&str> {
        self.get_cookie(SESSION_COOKIE)
    }

    /// Client address as far as the host can tell.
    ///
    /// The codec does not expose the peer socket address, so this trusts
    /// `X-Forwarded-For` only when the host is configured to sit behind a
    /// proxy, and falls back to `X-Real-IP`. Empty when neither is present.
    pub fn remote_addr(&self, trusted_proxy: bool) -> String {
        if trusted_proxy {
            if let Some(forwarded) = self.get_header("x-forwarded-for") {
                if let Some(first) = forwarded.split(',').next() {
                    return first.trim().to_string();
                }
            }
        }
        self.get_header("x-real-ip")
            .map(|ip| ip.trim().to_string())
            .unwrap_or_default()
    }
}

/// Lowercase a Host header value and strip any port.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let without_port = if let Some(stripped) = raw.strip_prefix('[') {
        // IPv6 literal: [::1]:8080
        stripped.split(']').next().unwrap_or(stripped)
    } else {
        raw.split(':').next().unwrap_or(raw)
    };
    without_port.to_ascii_lowercase()
}

/// Cookies from the (already lowercased) header set.
pub fn parse_cookies(headers: &HeaderVec) -> HeaderVec {
    let mut cookies = HeaderVec::new();
    let Some(raw) = headers
        .iter()
        .find(|(k, _)| k.as_ref() == "cookie")
        .map(|(_, v)| v.as_str())
    else {
        return cookies;
    };
    for pair in raw.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let Some(name) = parts.next().map(str::trim) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let value = parts.next().unwrap_or("").trim().to_string();
        cookies.push((Arc::from(name), value));
    }
    cookies
}

/// Query parameters from a raw path, URL-decoded.
pub fn parse_query_params(raw_path: &str) -> ParamVec {
    let mut params = ParamVec::new();
    if let Some(pos) = raw_path.find('?') {
        for (k, v) in url::form_urlencoded::parse(raw_path[pos + 1..].as_bytes()) {
            params.push((Arc::from(k.as_ref()), v.to_string()));
        }
    }
    params
}

/// Extract everything the host needs from a `may_minihttp::Request`.
pub fn parse_request(mut req: Request) -> ParsedRequest {
    let method = req
        .method()
        .parse::<Method>()
        .unwrap_or(Method::GET);
    let raw_path = req.path().to_string();
    let path = raw_path
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let mut headers = HeaderVec::new();
    for h in req.headers() {
        headers.push((
            Arc::from(h.name.to_ascii_lowercase().as_str()),
            String::from_utf8_lossy(h.value).to_string(),
        ));
    }

    let cookies = parse_cookies(&headers);
    let query_params = parse_query_params(&raw_path);

    let body = {
        let mut buf = String::new();
        match req.body().read_to_string(&mut buf) {
            Ok(n) if n > 0 => serde_json::from_str(&buf).ok(),
            _ => None,
        }
    };

    debug!(
        method = %method,
        path = %path,
        headers = headers.len(),
        cookies = cookies.len(),
        has_body = body.is_some(),
        "request parsed"
    );

    ParsedRequest {
        method,
        path,
        headers,
        cookies,
        query_params,
        body,
    }
}
