//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the mock upstream answers with.
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Start a programmable mock upstream on an ephemeral port.
///
/// The callback receives the request path and the raw header block.
pub async fn start_mock_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let head = String::from_utf8_lossy(&buf).to_string();
                        let path = head
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("/")
                            .to_string();

                        let response = f(path, head).await;
                        let status_text = match response.status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let extra: String = response
                            .headers
                            .iter()
                            .map(|(k, v)| format!("{}: {}\r\n", k, v))
                            .collect();
                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
                            status_text,
                            response.body.len(),
                            extra,
                            response.body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Write a zip archive with the given (entry name, contents) pairs.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

/// Write a file below `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// A typical deployment: one application archive plus a loose override directory.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub archive: std::path::PathBuf,
    pub loose_root: std::path::PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.jar");
        write_zip(
            &archive,
            &[
                ("META-INF/resources/VAADIN/build/app.js", b"console.log('app');"),
                ("META-INF/resources/shared.css", b"/* packaged */"),
                ("META-INF/resources/icons/logo.png", b"PNG-PACKAGED"),
                ("META-INF/resources/VAADIN/config/stats.json", b"{}"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
                ("com/example/Main.class", b"CAFEBABE"),
            ],
        );

        let loose_root = dir.path().join("web");
        write_file(&loose_root, "shared.css", b"/* loose */");
        write_file(&loose_root, "images/photo.png", b"PNG-LOOSE");
        write_file(&loose_root, "images/docs/index.html", b"<h1>docs</h1>");
        write_file(&loose_root, "images/empty/.keep", b"");

        Self {
            dir,
            archive,
            loose_root,
        }
    }

    pub fn resource_config(&self) -> webfront::config::ResourceConfig {
        webfront::config::ResourceConfig {
            archives: vec![self.archive.display().to_string()],
            loose_roots: vec![self.loose_root.display().to_string()],
            ..Default::default()
        }
    }
}

/// A front server running on an ephemeral port.
pub struct RunningFront {
    pub addr: SocketAddr,
    pub context: Arc<webfront::FrontContext<webfront::http::UpstreamHandler>>,
    pub shutdown: webfront::Shutdown,
    pub handle: tokio::task::JoinHandle<std::io::Result<webfront::dispatch::ShutdownReport>>,
}

impl RunningFront {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Build the context for `config` and serve it on 127.0.0.1:0.
pub async fn start_front(config: webfront::FrontConfig) -> RunningFront {
    let handler = Arc::new(webfront::http::UpstreamHandler::new(&config.upstream).unwrap());
    let context = Arc::new(webfront::build_context(config, handler).unwrap());

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = webfront::net::Listener::from_tcp(tcp, 64);

    let shutdown = webfront::Shutdown::from_config(&context.config.dispatcher);
    let server = webfront::FrontServer::new(context.clone());
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { server.run(listener, shutdown).await }
    });

    RunningFront {
        addr,
        context,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
