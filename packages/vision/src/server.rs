//! Disposable HTTP server hosting the viewer application
//!
//! The viewer is a static web app. When it is given as a local directory it
//! is served from a random localhost port for the duration of the render
//! phase, then shut down.

use crate::viewer::ViewerError;
use percent_encoding::percent_decode_str;
use std::fs::File;
use std::net::TcpListener;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serves files below a root directory until stopped or dropped.
pub struct ViewerServer {
    server: Arc<Server>,
    port: u16,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ViewerServer {
    /// Start serving `root` on a random available port.
    pub fn start(root: PathBuf) -> Result<Self, ViewerError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();

        let server = Server::from_listener(listener, None)
            .map_err(|e| ViewerError::Io(std::io::Error::other(e.to_string())))?;
        let server = Arc::new(server);
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let server = Arc::clone(&server);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || serve(&server, &root, &shutdown))
        };

        debug!(port, "viewer server started");
        Ok(Self {
            server,
            port,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ViewerServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(server: &Server, root: &Path, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => respond(request, root),
            Ok(None) => continue,
            Err(_) => break,
        }
    }
}

fn respond(request: Request, root: &Path) {
    let result = match resolve(root, request.url()) {
        Some(path) if path.is_file() => match File::open(&path) {
            Ok(file) => {
                let mut response = Response::from_file(file);
                if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type(&path).as_bytes()) {
                    response = response.with_header(header);
                }
                request.respond(response)
            }
            Err(_) => request.respond(Response::from_string("forbidden").with_status_code(403)),
        },
        _ => {
            debug!(url = request.url(), "viewer asset not found");
            request.respond(Response::from_string("not found").with_status_code(404))
        }
    };

    if let Err(e) = result {
        warn!("failed to answer viewer request: {}", e);
    }
}

/// Map a request URL onto a file below `root`, refusing to leave it.
fn resolve(root: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or("");
    let path = path.trim_start_matches('/');
    let path = if path.is_empty() || path.ends_with('/') {
        format!("{}index.html", path)
    } else {
        path.to_string()
    };
    let path = percent_decode_str(&path).decode_utf8().ok()?;

    let relative = Path::new(&*path);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }

    Some(root.join(relative))
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=UTF-8",
        Some("js") | Some("mjs") => "text/javascript; charset=UTF-8",
        Some("css") => "text/css; charset=UTF-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Where the viewer application lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerSource {
    /// A URL used as-is (`http://`, `https://` or `file://`).
    Url(String),

    /// A local directory served over HTTP; `entry` is the page to open.
    Directory { root: PathBuf, entry: String },
}

impl ViewerSource {
    /// Interpret a configured viewer location: URLs pass through, a directory
    /// is served from its `index.html`, a file is served from its directory.
    pub fn parse(location: &str) -> Self {
        if ["http://", "https://", "file://"]
            .iter()
            .any(|scheme| location.starts_with(scheme))
        {
            return ViewerSource::Url(location.to_string());
        }

        let path = PathBuf::from(location);
        if path.is_dir() {
            return ViewerSource::Directory {
                root: path,
                entry: "index.html".to_string(),
            };
        }

        let entry = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.html".to_string());
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        ViewerSource::Directory { root, entry }
    }

    /// Make the viewer reachable, starting a server when needed.
    pub fn host(&self) -> Result<HostedViewer, ViewerError> {
        match self {
            ViewerSource::Url(url) => Ok(HostedViewer {
                url: url.clone(),
                server: None,
            }),
            ViewerSource::Directory { root, entry } => {
                if !root.join(entry).is_file() {
                    return Err(ViewerError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("viewer page not found: {}", root.join(entry).display()),
                    )));
                }
                let server = ViewerServer::start(root.clone())?;
                Ok(HostedViewer {
                    url: format!("{}/{}", server.url(), entry),
                    server: Some(server),
                })
            }
        }
    }
}

/// A reachable viewer; the backing server stops when this is dropped.
pub struct HostedViewer {
    pub url: String,
    server: Option<ViewerServer>,
}

impl HostedViewer {
    pub fn is_served(&self) -> bool {
        self.server.is_some()
    }
}
