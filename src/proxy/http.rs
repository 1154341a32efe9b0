//! HTTP forward proxy with CONNECT tunneling and domain filtering.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::FenceError;
use crate::proxy::filter::{DomainFilter, FilterDecision};
use crate::utils::debug::{is_debug_enabled, is_monitor_enabled};

/// Response body for blocked requests; tests key on this text.
pub const BLOCKED_MESSAGE: &str = "Connection blocked by network allowlist";

/// Bound on dialing the origin for CONNECT and forwarded requests.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall bound on a forwarded non-CONNECT exchange.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on draining live connections at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP proxy server bound to loopback.
pub struct HttpProxy {
    listener: Option<TcpListener>,
    port: u16,
    filter: Arc<DomainFilter>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl HttpProxy {
    /// Bind to loopback. Port 0 picks an ephemeral port.
    pub async fn bind(filter: Arc<DomainFilter>, port: u16) -> Result<Self, FenceError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| FenceError::Proxy(format!("http proxy bind failed: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| FenceError::Proxy(e.to_string()))?
            .port();

        tracing::debug!("HTTP proxy listening on 127.0.0.1:{port}");

        Ok(Self {
            listener: Some(listener),
            port,
            filter,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start serving. Each connection runs in its own tracked task.
    pub fn start(&mut self) -> Result<(), FenceError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| FenceError::Proxy("http proxy already started".to_string()))?;
        let filter = self.filter.clone();
        let cancel = self.cancel.clone();
        let tracker = self.tracker.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                let filter = filter.clone();
                                tracker.spawn(async move {
                                    if let Err(e) = serve_connection(stream, filter).await {
                                        tracing::debug!("http proxy connection from {addr}: {e}");
                                    }
                                });
                            }
                            Err(e) => tracing::debug!("http proxy accept error: {e}"),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Stop accepting and drain outstanding connections, bounded.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.tracker.wait()).await;
    }
}

async fn serve_connection(
    stream: TcpStream,
    filter: Arc<DomainFilter>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let io = TokioIo::new(stream);
    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(
            io,
            service_fn(move |req| {
                let filter = filter.clone();
                async move { handle_request(req, filter).await }
            }),
        )
        .with_upgrades()
        .await?;
    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    filter: Arc<DomainFilter>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    if req.method() == Method::CONNECT {
        handle_connect(req, filter).await
    } else {
        handle_forward(req, filter).await
    }
}

/// CONNECT: check policy, then tunnel the upgraded stream to the origin.
async fn handle_connect(
    req: Request<hyper::body::Incoming>,
    filter: Arc<DomainFilter>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let started = Instant::now();
    let host = req.uri().host().unwrap_or_default().to_string();
    let port = req.uri().port_u16().unwrap_or(443);

    if !filter.is_allowed(&host, port) {
        log_decision("CONNECT", &host, 403, FilterDecision::Deny, started);
        return Ok(Response::builder()
            .status(StatusCode::FORBIDDEN)
            .body(full_body(BLOCKED_MESSAGE))
            .unwrap());
    }

    // Dial before answering so a dead origin surfaces as 502, not as an
    // immediately-closed tunnel.
    let origin =
        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(origin)) => origin,
            Ok(Err(e)) => {
                tracing::debug!("dial {host}:{port}: {e}");
                log_decision("CONNECT", &host, 502, FilterDecision::Allow, started);
                return Ok(bad_gateway("Failed to connect to origin"));
            }
            Err(_) => {
                log_decision("CONNECT", &host, 502, FilterDecision::Allow, started);
                return Ok(bad_gateway("Origin dial timed out"));
            }
        };

    log_decision("CONNECT", &host, 200, FilterDecision::Allow, started);

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(e) = tunnel(upgraded, origin).await {
                    tracing::debug!("tunnel to {host}:{port}: {e}");
                }
            }
            Err(e) => tracing::debug!("connect upgrade: {e}"),
        }
    });

    Ok(Response::new(empty_body()))
}

/// Splice client and origin until either side closes.
async fn tunnel(
    upgraded: hyper::upgrade::Upgraded,
    origin: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut upgraded = TokioIo::new(upgraded);
    let (mut origin_read, mut origin_write) = origin.into_split();
    let (mut client_read, mut client_write) = tokio::io::split(&mut upgraded);

    let client_to_origin = tokio::io::copy(&mut client_read, &mut origin_write);
    let origin_to_client = tokio::io::copy(&mut origin_read, &mut client_write);
    tokio::try_join!(client_to_origin, origin_to_client)?;
    Ok(())
}

/// Plain HTTP: check policy, then forge an upstream request and stream the
/// response back. Redirects are not followed.
async fn handle_forward(
    req: Request<hyper::body::Incoming>,
    filter: Arc<DomainFilter>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let started = Instant::now();
    let method = req.method().to_string();

    let host = req
        .uri()
        .host()
        .map(|h| h.to_string())
        .or_else(|| {
            req.headers()
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.split(':').next().unwrap_or(h).to_string())
        })
        .unwrap_or_default();
    let port = req
        .uri()
        .port_u16()
        .unwrap_or(if req.uri().scheme_str() == Some("https") {
            443
        } else {
            80
        });

    if !filter.is_allowed(&host, port) {
        log_decision(&method, &host, 403, FilterDecision::Deny, started);
        return Ok(Response::builder()
            .status(StatusCode::FORBIDDEN)
            .body(full_body(BLOCKED_MESSAGE))
            .unwrap());
    }

    let result = tokio::time::timeout(REQUEST_TIMEOUT, forward(req, &host, port)).await;
    let response = match result {
        Ok(response) => response,
        Err(_) => Response::builder()
            .status(StatusCode::GATEWAY_TIMEOUT)
            .body(full_body("Upstream request timed out"))
            .unwrap(),
    };
    log_decision(
        &method,
        &host,
        response.status().as_u16(),
        FilterDecision::Allow,
        started,
    );
    Ok(response)
}

async fn forward(
    req: Request<hyper::body::Incoming>,
    host: &str,
    port: u16,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let stream = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!("dial {host}:{port}: {e}");
            return bad_gateway("Failed to connect to upstream");
        }
        Err(_) => return bad_gateway("Upstream dial timed out"),
    };

    let io = TokioIo::new(stream);
    let (mut sender, connection) = match hyper::client::conn::http1::handshake(io).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::debug!("upstream handshake with {host}:{port}: {e}");
            return bad_gateway("Upstream handshake failed");
        }
    };
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("upstream connection: {e}");
        }
    });

    let upstream_req = strip_to_origin_form(req, host, port);
    match sender.send_request(upstream_req).await {
        Ok(response) => response.map(|body| body.boxed()),
        Err(e) => {
            tracing::debug!("upstream request to {host}:{port}: {e}");
            bad_gateway("Upstream request failed")
        }
    }
}

/// Rewrite an absolute-form proxy request into origin form, dropping
/// hop-by-hop proxy headers.
fn strip_to_origin_form<B>(req: Request<B>, host: &str, port: u16) -> Request<B> {
    let (mut parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    if let Ok(uri) = path_and_query.parse() {
        parts.uri = uri;
    }

    parts.headers.remove("proxy-connection");
    parts.headers.remove(hyper::header::PROXY_AUTHORIZATION);

    if !parts.headers.contains_key(hyper::header::HOST) {
        let value = if port == 80 {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
        if let Ok(value) = value.parse() {
            parts.headers.insert(hyper::header::HOST, value);
        }
    }

    Request::from_parts(parts, body)
}

/// One line per decision: emitted at debug, and raised to info in monitor
/// mode for blocks and errors. The subscriber prefixes wall-clock time.
fn log_decision(method: &str, host: &str, status: u16, decision: FilterDecision, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis();
    let verdict = match decision {
        FilterDecision::Allow => "allow",
        FilterDecision::Deny => "deny",
    };
    let noteworthy = decision == FilterDecision::Deny || status >= 400;
    if is_monitor_enabled() && noteworthy {
        tracing::info!("{method} {host} -> {status} ({verdict}, {elapsed_ms}ms)");
    } else if is_debug_enabled() {
        tracing::debug!("{method} {host} -> {status} ({verdict}, {elapsed_ms}ms)");
    }
}

fn bad_gateway(message: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .body(full_body(message))
        .unwrap()
}

fn empty_body() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn full_body(s: &str) -> BoxBody<Bytes, hyper::Error> {
    Full::new(Bytes::from(s.to_string()))
        .map_err(|never| match never {})
        .boxed()
}
