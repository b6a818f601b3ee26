//! Encoding of a pooled response onto the wire.

use crate::dispatch::Response;
use crate::server::request::SESSION_COOKIE;
use crate::static_files;
use may_minihttp::Response as HttpResponse;
use serde_json::Value;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Flush a pooled response to the codec.
///
/// A static-file reference takes the place of the buffer; a file that
/// disappeared between resolution and encode degrades to a 404. The
/// session cookie is (re)issued only for recent sessions: an established
/// session already holds its token.
pub fn encode(out: &mut HttpResponse, response: &Response) {
    let (status, body, override_content_type) = match response.file() {
        Some(path) => match static_files::read_file(path) {
            Ok(bytes) => (response.status(), bytes, None),
            Err(_) => (
                404,
                br#"{"error":"Not Found"}"#.to_vec(),
                Some("application/json"),
            ),
        },
        None => (response.status(), response.body().to_vec(), None),
    };

    out.status_code(status as usize, status_reason(status));

    for (name, value) in response.headers() {
        if override_content_type.is_some() && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        let header = format!("{name}: {value}").into_boxed_str();
        out.header(Box::leak(header));
    }
    if let Some(ct) = override_content_type {
        let header = format!("Content-Type: {ct}").into_boxed_str();
        out.header(Box::leak(header));
    }

    if let Some(session) = response.session() {
        if session.is_recent() {
            if let Some(token) = session.token() {
                let cookie =
                    format!("Set-Cookie: {SESSION_COOKIE}={token}; Path=/; HttpOnly")
                        .into_boxed_str();
                out.header(Box::leak(cookie));
            }
        }
    }

    out.body_vec(body);
}

/// Fixed JSON error written without any application involvement.
pub fn write_json_error(out: &mut HttpResponse, status: u16, body: Value) {
    out.status_code(status as usize, status_reason(status));
    out.header("Content-Type: application/json");
    out.body_vec(body.to_string().into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(503), "Service Unavailable");
        assert_eq!(status_reason(299), "OK");
    }
}
