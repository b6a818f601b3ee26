//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Once;

/// Ensures the may runtime and tracing are configured only once per test
/// binary.
static MAY_INIT: Once = Once::new();

pub fn setup_may_runtime() {
    MAY_INIT.call_once(|| {
        may::config().set_stack_size(0x8000);
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub mod apps {
    use std::path::{Path, PathBuf};

    /// Lay down one application root: `app.yaml` plus any extra files
    /// (relative paths, parents created as needed).
    pub fn write_app(
        apps_dir: &Path,
        name: &str,
        manifest: &str,
        files: &[(&str, &str)],
    ) -> PathBuf {
        let root = apps_dir.join(name);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("app.yaml"), manifest).unwrap();
        for (rel, content) in files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        root
    }

    /// Manifest with a single echo-backed action, the smallest app that
    /// dispatches.
    pub fn echo_manifest() -> &'static str {
        "actions:\n  - route: /echo\n    handler: echo\n    content_type: application/json\n"
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    pub struct HttpReply {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl HttpReply {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    /// A keep-alive connection speaking raw HTTP/1.1, so tests can drive
    /// several requests over one socket.
    pub struct Conn {
        stream: TcpStream,
    }

    impl Conn {
        pub fn open(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            Self { stream }
        }

        pub fn request(
            &mut self,
            method: &str,
            path: &str,
            host: &str,
            headers: &[(&str, &str)],
            body: Option<&str>,
        ) -> HttpReply {
            let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\n");
            for (name, value) in headers {
                raw.push_str(&format!("{name}: {value}\r\n"));
            }
            if let Some(body) = body {
                raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            raw.push_str("\r\n");
            if let Some(body) = body {
                raw.push_str(body);
            }
            self.stream.write_all(raw.as_bytes()).unwrap();
            read_reply(&mut self.stream)
        }
    }

    /// One-shot request on a fresh connection.
    pub fn send_request(
        addr: SocketAddr,
        method: &str,
        path: &str,
        host: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> HttpReply {
        Conn::open(addr).request(method, path, host, headers, body)
    }

    fn read_reply(stream: &mut TcpStream) -> HttpReply {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            if let Some(pos) = find_header_end(&buf) {
                break pos;
            }
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before headers completed");
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let status: u16 = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        let content_length: usize = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);

        let mut body = buf[header_end + 4..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before body completed");
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(content_length);

        HttpReply {
            status,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        }
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }
}

pub mod test_host {
    use std::net::{SocketAddr, TcpListener};
    use std::path::Path;
    use std::sync::Arc;
    use tenement::config::HostConfig;
    use tenement::host::Host;
    use tenement::server::ServerHandle;

    /// RAII fixture: a deployed host serving on a loopback port, shut down
    /// on drop.
    pub struct TestHost {
        pub host: Arc<Host>,
        pub addr: SocketAddr,
        handle: Option<ServerHandle>,
        _base: tempfile::TempDir,
    }

    impl TestHost {
        pub fn start(
            write_apps: impl FnOnce(&Path),
            configure: impl FnOnce(&mut Host),
        ) -> Self {
            super::setup_may_runtime();

            let base = tempfile::tempdir().unwrap();
            let apps_dir = base.path().join("apps");
            std::fs::create_dir_all(&apps_dir).unwrap();
            write_apps(&apps_dir);

            let mut config = HostConfig::default();
            config.listen_address = "127.0.0.1".to_string();
            config.listen_port = free_port();
            config.sweep_interval_secs = 1;

            let mut host = Host::new(base.path(), config);
            configure(&mut host);
            host.deploy().unwrap();

            let host = Arc::new(host);
            let handle = host.start().unwrap();
            handle.wait_ready().unwrap();
            let addr = handle.addr();

            Self {
                host,
                addr,
                handle: Some(handle),
                _base: base,
            }
        }
    }

    impl Drop for TestHost {
        fn drop(&mut self) {
            self.host.shutdown();
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }
}
