use anyhow::{anyhow, Context, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::cors::{CorsDecision, CorsPolicy};
use super::http::{read_request, write_response, HttpRequest, HttpResponse};
use super::upstream::{valid_version, Upload, UpstreamClient};
use crate::config::ProxyConfig;
use crate::detect::{Transport, UreqTransport};
use crate::multipart;

pub const MISSING_FILE_ERROR: &str = "No file uploaded. Use form-data with key \"file\".";
const PREFLIGHT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct ProxyHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ProxyHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("proxy server thread panicked"))?;
        }
        Ok(())
    }
}

/// Shared, read-only state for connection threads.
pub struct Relay {
    cors: CorsPolicy,
    upstream: UpstreamClient,
    max_upload_bytes: usize,
}

impl Relay {
    pub fn new(config: &ProxyConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self {
            cors: CorsPolicy::new(&config.cors)?,
            upstream: UpstreamClient::new(config.upstream.clone(), transport),
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    /// Route one request. CORS applies to every route, as a middleware would.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let origin = match self.cors.check(request.header("origin")) {
            CorsDecision::Blocked(origin) => {
                return HttpResponse::error(403, &format!("CORS blocked for origin {origin}"));
            }
            CorsDecision::Allowed(origin) => Some(origin),
            CorsDecision::NoOrigin => None,
        };

        let response = match (request.method.as_str(), request.path.as_str()) {
            ("OPTIONS", _) => preflight(request),
            ("GET", "/health") | ("HEAD", "/health") => HttpResponse::json(200, r#"{"ok":true}"#),
            ("POST", "/detect") => self.detect(request),
            (_, "/detect") | (_, "/health") => HttpResponse::error(405, "method not allowed"),
            _ => HttpResponse::error(404, "not found"),
        };
        match origin {
            Some(origin) => response
                .with_header("Access-Control-Allow-Origin", origin)
                .with_header("Access-Control-Allow-Credentials", "true")
                .with_header("Vary", "Origin"),
            None => response,
        }
    }

    fn detect(&self, request: &HttpRequest) -> HttpResponse {
        let content_type = request.header("content-type").unwrap_or_default();
        let file = if multipart::boundary_from_content_type(content_type).is_some() {
            match multipart::parse(content_type, &request.body) {
                Ok(parts) => parts
                    .into_iter()
                    .find(|part| part.name == "file" && part.filename.is_some()),
                Err(err) => {
                    log::warn!("/detect malformed multipart body: {:#}", err);
                    None
                }
            }
        } else {
            None
        };
        log::info!(
            "/detect received has_file={} filename={:?} mimetype={:?} size={}",
            file.is_some(),
            file.as_ref().and_then(|f| f.filename.as_deref()),
            file.as_ref().and_then(|f| f.content_type.as_deref()),
            file.as_ref().map(|f| f.data.len()).unwrap_or(0)
        );
        let Some(file) = file else {
            return HttpResponse::error(400, MISSING_FILE_ERROR);
        };

        let version = request
            .query_param("version")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.upstream.default_version().to_string());
        if !valid_version(&version) {
            return HttpResponse::error(400, "invalid model version");
        }

        let upload = Upload {
            data: &file.data,
            filename: file.filename.as_deref(),
            content_type: file.content_type.as_deref(),
        };
        match self.upstream.forward(&upload, &version) {
            Ok(reply) if reply.is_success() => {
                if serde_json::from_slice::<serde_json::Value>(&reply.body).is_ok() {
                    HttpResponse::json(200, reply.body)
                } else {
                    log::warn!(
                        "upstream returned a non-JSON body ({:?}); passing it through",
                        reply.content_type
                    );
                    HttpResponse {
                        status: 200,
                        content_type: Some(
                            reply
                                .content_type
                                .unwrap_or_else(|| "application/octet-stream".to_string()),
                        ),
                        headers: Vec::new(),
                        body: reply.body,
                    }
                }
            }
            Ok(reply) => {
                if serde_json::from_slice::<serde_json::Value>(&reply.body).is_ok() {
                    HttpResponse::json(reply.status, reply.body)
                } else {
                    let text = self.upstream.redact(&reply.body_text());
                    HttpResponse::error(reply.status, text.trim())
                }
            }
            Err(err) => HttpResponse::error(500, &err.0),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }
}

fn preflight(request: &HttpRequest) -> HttpResponse {
    let mut response = HttpResponse::empty(204).with_header("Access-Control-Allow-Methods", PREFLIGHT_METHODS);
    if let Some(headers) = request.header("access-control-request-headers") {
        response = response
            .with_header("Access-Control-Allow-Headers", headers)
            .with_header("Vary", "Access-Control-Request-Headers");
    }
    response
}

pub struct ProxyServer {
    config: ProxyConfig,
    transport: Arc<dyn Transport>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(config: ProxyConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn spawn(self) -> Result<ProxyHandle> {
        let relay = Arc::new(Relay::new(&self.config, self.transport)?);
        let listener = bind_with_retry(&self.config.host, self.config.port, self.config.port_retries)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("CORS allowed origins: {}", relay.cors.origins().join(", "));

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_proxy(listener, relay, shutdown_thread) {
                log::error!("detection relay stopped: {}", err);
            }
        });

        Ok(ProxyHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

/// Bind `host:port`; while the port is taken, move to the next one, at most
/// `retries` times. Port 0 asks the OS for any free port.
pub fn bind_with_retry(host: &str, port: u16, retries: u16) -> Result<TcpListener> {
    let mut port = port;
    let mut retries_left = retries;
    loop {
        match TcpListener::bind((host, port)) {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == ErrorKind::AddrInUse && retries_left > 0 && port != 0 => {
                let next = port
                    .checked_add(1)
                    .ok_or_else(|| anyhow!("no port left above {port}"))?;
                log::warn!("port {} in use, switching to {}", port, next);
                port = next;
                retries_left -= 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to bind {host}:{port}"));
            }
        }
    }
}

fn run_proxy(listener: TcpListener, relay: Arc<Relay>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let relay = Arc::clone(&relay);
                let spawned = std::thread::Builder::new()
                    .name("relay-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &relay) {
                            log::warn!("relay connection from {} failed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("failed to spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, relay: &Relay) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    let started = Instant::now();
    let (label, mut response, head_only) = match read_request(&mut stream, relay.max_upload_bytes()) {
        Ok(request) => (
            format!("{} {}", request.method, request.path),
            relay.handle(&request),
            request.method == "HEAD",
        ),
        Err(err) => (
            "-".to_string(),
            HttpResponse::error(err.status, &err.message),
            false,
        ),
    };
    let body_len = response.body.len();
    if head_only {
        response.body.clear();
    }
    write_response(&mut stream, &response)?;
    log::info!(
        "{} {} {} ms - {}",
        label,
        response.status,
        started.elapsed().as_millis(),
        body_len
    );
    Ok(())
}
