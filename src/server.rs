//! The listener: unary calls over HTTP, health probes, graceful shutdown.
//!
//! # Wire format
//!
//! Every RPC is a `POST` to its method path with the JSON-encoded request as
//! body. The answer is always HTTP `200` in "trailers-only" style: the call's
//! status travels in the `grpc-status` (numeric code) and `grpc-message`
//! (percent-encoded) headers, next to whatever trailer metadata the pipeline
//! set. A successful call carries the JSON-encoded response as body; a failed
//! one carries none.
//!
//! Request headers become the call's incoming metadata, except transport
//! headers (`grpc-*`, `content-*`, `host`, hop-by-hop). A `grpc-timeout`
//! header (`<digits><H|M|S|m|u|n>`) sets the call's deadline. Once it passes
//! the handler is abandoned and fails with `DeadlineExceeded`, which travels
//! back out through every interceptor like any other failure.
//!
//! # Shutdown
//!
//! [`RunningListener::stop`] flips readiness to `NOT_SERVING`, stops accepting
//! connections, then gives in-flight connections the configured grace period
//! to finish before aborting whatever is left.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::context::CallContext;
use crate::error::{ConfigError, Error, ServeError};
use crate::handler::ErasedHandler;
use crate::health::{self, HealthReporter, ServingStatus};
use crate::metadata::Metadata;
use crate::router::{MethodTable, Routes};
use crate::status::{Code, Status};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

// ── Configuration ─────────────────────────────────────────────────────────────

/// Where to listen and how long to drain on shutdown.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub addr: SocketAddr,
    pub grace_period: Duration,
}

impl ListenerConfig {
    /// Listen on `0.0.0.0:port` with a one second grace period.
    pub fn new(port: u16) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Reads `GATEHOUSE_PORT` (required) and `GATEHOUSE_GRACE_PERIOD_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        const PORT: &str = "GATEHOUSE_PORT";
        const GRACE: &str = "GATEHOUSE_GRACE_PERIOD_MS";

        let port = lookup(PORT).ok_or(ConfigError::Missing(PORT))?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid { var: PORT, value: port.clone() })?;

        let mut config = Self::new(port);
        if let Some(ms) = lookup(GRACE) {
            let ms = ms
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid { var: GRACE, value: ms.clone() })?;
            config.grace_period = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// A unary RPC listener with an interceptor chain applied to every method.
pub struct Listener {
    config: ListenerConfig,
    chain: Chain,
    health: HealthReporter,
    registry: Option<Registry>,
}

impl Listener {
    pub fn new(config: ListenerConfig, chain: Chain) -> Self {
        Self { config, chain, health: HealthReporter::new(), registry: None }
    }

    /// Serves `registry` in Prometheus text format on `GET /metrics`.
    pub fn with_metrics(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn health(&self) -> HealthReporter {
        self.health.clone()
    }

    /// Binds the socket, marks the listener `SERVING` and starts accepting
    /// connections in the background.
    pub async fn start(self, routes: Routes) -> Result<RunningListener, ServeError> {
        if let Err(violation) = self.chain.check_order() {
            warn!(chain = ?self.chain, "interceptor chain is misordered: {violation}");
        }

        let listener = TcpListener::bind(self.config.addr).await?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            methods: routes.into_table(&self.chain),
            health: self.health.clone(),
            registry: self.registry,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, shared, shutdown_rx, self.config.grace_period));

        self.health.set(ServingStatus::Serving);
        info!(addr = %local_addr, "gatehouse listening");

        Ok(RunningListener { local_addr, health: self.health, shutdown: shutdown_tx, task })
    }

    /// Runs until SIGTERM or Ctrl-C, then stops gracefully.
    pub async fn serve(self, routes: Routes) -> Result<(), ServeError> {
        let running = self.start(routes).await?;
        shutdown_signal().await;
        running.stop().await;
        Ok(())
    }
}

/// Handle on a started [`Listener`].
pub struct RunningListener {
    local_addr: SocketAddr,
    health: HealthReporter,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningListener {
    /// The bound address; useful when the configured port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn health(&self) -> HealthReporter {
        self.health.clone()
    }

    /// Stops gracefully, then forcibly once the grace period is over.
    pub async fn stop(self) {
        self.health.set(ServingStatus::NotServing);
        debug!("stopping gatehouse gracefully...");

        // The accept loop may already be gone if it failed; nothing to signal then.
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("accept loop failed: {e}");
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

struct Shared {
    methods: MethodTable,
    health: HealthReporter,
    registry: Option<Registry>,
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: oneshot::Receiver<()>,
    grace_period: Duration,
) {
    let mut tasks = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let shared = Arc::clone(&shared);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| {
                        let shared = Arc::clone(&shared);
                        async move { dispatch(shared, req).await }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        debug!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);

    let drained = tokio::time::timeout(grace_period, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        debug!(remaining = tasks.len(), "grace period over, aborting connections");
        tasks.shutdown().await;
    }

    info!("gatehouse stopped");
}

// ── Request dispatch ──────────────────────────────────────────────────────────

type HttpResponse = http::Response<Full<Bytes>>;

/// Routes one HTTP request and produces one HTTP response.
///
/// Every failure is reported in-band as a status, so hyper never sees an error.
async fn dispatch(
    shared: Arc<Shared>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<HttpResponse, Infallible> {
    let path = req.uri().path().to_owned();

    if req.method() == http::Method::GET {
        match path.as_str() {
            "/healthz" => return Ok(health::liveness()),
            "/readyz" => return Ok(health::readiness(&shared.health)),
            "/metrics" => {
                if let Some(registry) = &shared.registry {
                    return Ok(metrics_text(registry));
                }
            }
            _ => {}
        }
    }

    let Some(method) = shared.methods.lookup(&path) else {
        return Ok(reply(Err(Status::unimplemented(format!("unknown method {path}")).into()), Metadata::new()));
    };
    if req.method() != http::Method::POST {
        return Ok(reply(Err(Status::unimplemented("unary calls must use POST").into()), Metadata::new()));
    }

    let metadata = incoming_metadata(req.headers());
    let deadline = req.headers()
        .get("grpc-timeout")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout)
        .map(|timeout| Instant::now() + timeout);

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let err = Status::internal(format!("failed to read request body: {e}"));
            return Ok(reply(Err(err.into()), Metadata::new()));
        }
    };

    let request = match (method.decode)(&body) {
        Ok(request) => request,
        Err(err) => return Ok(reply(Err(err), Metadata::new())),
    };

    let mut ctx = CallContext::new(path).with_metadata(metadata);
    if let Some(deadline) = deadline {
        ctx = ctx.with_deadline(deadline);
    }
    let trailer = ctx.trailer().clone();

    let outcome = method.handler.call(ctx, request).await;

    let trailer = trailer.seal();
    Ok(reply(outcome.and_then(|resp| (method.encode)(&resp)), trailer))
}

/// Builds the trailers-only HTTP response for a finished call.
fn reply(result: Result<Vec<u8>, Error>, trailer: Metadata) -> HttpResponse {
    let (status, body) = match result {
        Ok(body) => (Status::new(Code::Ok, ""), body),
        Err(err) => (err.status(), Vec::new()),
    };

    let mut resp = http::Response::new(Full::new(Bytes::from(body)));
    let headers = resp.headers_mut();
    headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    headers.insert("grpc-status", http::HeaderValue::from(i32::from(status.code())));
    if !status.message().is_empty() {
        if let Ok(value) = http::HeaderValue::from_str(&urlencoding::encode(status.message())) {
            headers.insert("grpc-message", value);
        }
    }
    for (key, value) in trailer {
        match (http::HeaderName::from_bytes(key.as_bytes()), http::HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(key = %key, "dropping trailer field that is not a valid header"),
        }
    }
    resp
}

fn metrics_text(registry: &Registry) -> HttpResponse {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    let (status, body) = match encoder.encode(&registry.gather(), &mut buf) {
        Ok(()) => (http::StatusCode::OK, buf),
        Err(e) => {
            error!("failed to encode metrics: {e}");
            (http::StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    };

    let mut resp = http::Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    if let Ok(value) = http::HeaderValue::from_str(encoder.format_type()) {
        resp.headers_mut().insert(http::header::CONTENT_TYPE, value);
    }
    resp
}

/// Request headers that belong to the application rather than the transport.
fn incoming_metadata(headers: &http::HeaderMap) -> Metadata {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !(name.starts_with("grpc-")
                || name.starts_with("content-")
                || matches!(name, "host" | "connection" | "te" | "transfer-encoding" | "keep-alive" | "upgrade"))
        })
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .collect()
}

/// Parses a `grpc-timeout` value: at most eight digits and a unit.
fn parse_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(n * 3600),
        "M" => Duration::from_secs(n * 60),
        "S" => Duration::from_secs(n),
        "m" => Duration::from_millis(n),
        "u" => Duration::from_micros(n),
        "n" => Duration::from_nanos(n),
        _ => return None,
    };
    Some(timeout)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A signal handler that cannot be
/// installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn timeouts_parse_every_unit() {
        assert_eq!(parse_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout("100m"), Some(Duration::from_millis(100)));
        assert_eq!(parse_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_timeout("9n"), Some(Duration::from_nanos(9)));
    }

    #[test]
    fn malformed_timeouts_are_ignored() {
        assert_eq!(parse_timeout("S"), None);
        assert_eq!(parse_timeout("10x"), None);
        assert_eq!(parse_timeout("123456789S"), None);
        assert_eq!(parse_timeout("-1S"), None);
    }

    #[test]
    fn status_messages_are_percent_encoded() {
        let err = Error::from(Status::internal("100% done\né"));
        let resp = reply(Err(err), Metadata::new());
        assert_eq!(resp.headers()["grpc-message"], "100%25%20done%0A%C3%A9");
    }

    #[test]
    fn transport_headers_are_not_metadata() {
        let mut headers = http::HeaderMap::new();
        headers.insert("host", "localhost".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("grpc-timeout", "1S".parse().unwrap());
        headers.insert("authorization", "Bearer t".parse().unwrap());
        headers.insert("x-user-id", "42".parse().unwrap());

        let md = incoming_metadata(&headers);
        assert_eq!(md.len(), 2);
        assert_eq!(md.get("authorization"), Some("Bearer t"));
        assert_eq!(md.get("x-user-id"), Some("42"));
    }

    #[test]
    fn reply_carries_status_and_trailer_in_headers() {
        let err = crate::ApplicationError::new(Code::InvalidArgument, "Failed");
        let resp = reply(Err(err.into()), Metadata::new().with("code", "APPLICATION_ERROR"));

        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(resp.headers()["grpc-status"], "3");
        assert_eq!(resp.headers()["grpc-message"], "Failed");
        assert_eq!(resp.headers()["code"], "APPLICATION_ERROR");
    }

    #[test]
    fn successful_reply_has_ok_status_and_no_message() {
        let resp = reply(Ok(b"{}".to_vec()), Metadata::new());
        assert_eq!(resp.headers()["grpc-status"], "0");
        assert!(resp.headers().get("grpc-message").is_none());
    }

    #[test]
    fn config_reads_port_and_grace_period() {
        let env: HashMap<&str, &str> =
            [("GATEHOUSE_PORT", "50051"), ("GATEHOUSE_GRACE_PERIOD_MS", "250")].into();
        let config = ListenerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.addr.port(), 50051);
        assert_eq!(config.grace_period, Duration::from_millis(250));
    }

    #[test]
    fn config_defaults_the_grace_period() {
        let config = ListenerConfig::from_lookup(|k| (k == "GATEHOUSE_PORT").then(|| "8080".into())).unwrap();
        assert_eq!(config.grace_period, DEFAULT_GRACE_PERIOD);
    }

    #[test]
    fn config_rejects_missing_or_bad_port() {
        assert!(matches!(
            ListenerConfig::from_lookup(|_| None),
            Err(ConfigError::Missing("GATEHOUSE_PORT"))
        ));
        assert!(matches!(
            ListenerConfig::from_lookup(|_| Some("not-a-port".into())),
            Err(ConfigError::Invalid { var: "GATEHOUSE_PORT", .. })
        ));
    }
}
