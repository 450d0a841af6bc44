//! Serving status and the built-in health probes.
//!
//! The listener answers two HTTP probes next to its RPC endpoints:
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `GET /healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `GET /readyz` | Is the listener accepting calls? Failure → pulled from load-balancer. |
//!
//! Readiness follows the [`HealthReporter`] of the listener: `SERVING` from
//! [`Listener::start`](crate::Listener::start) until
//! [`RunningListener::stop`](crate::RunningListener::stop) begins. Flip it
//! yourself to drain traffic while a dependency is down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use http_body_util::Full;

/// Whether the listener wants traffic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

impl ServingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown    => "UNKNOWN",
            Self::Serving    => "SERVING",
            Self::NotServing => "NOT_SERVING",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Serving,
            2 => Self::NotServing,
            _ => Self::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown    => 0,
            Self::Serving    => 1,
            Self::NotServing => 2,
        }
    }
}

/// Shared handle on a listener's serving status.
#[derive(Clone, Debug, Default)]
pub struct HealthReporter {
    status: Arc<AtomicU8>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ServingStatus {
        ServingStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set(&self, status: ServingStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }
}

/// Liveness probe: always `200 OK` with body `"ok"`.
pub(crate) fn liveness() -> http::Response<Full<Bytes>> {
    text(http::StatusCode::OK, "ok")
}

/// Readiness probe: `200 ready` while serving, `503` with the status name
/// otherwise.
pub(crate) fn readiness(health: &HealthReporter) -> http::Response<Full<Bytes>> {
    match health.status() {
        ServingStatus::Serving => text(http::StatusCode::OK, "ready"),
        other => text(http::StatusCode::SERVICE_UNAVAILABLE, other.as_str()),
    }
}

fn text(status: http::StatusCode, body: &'static str) -> http::Response<Full<Bytes>> {
    let mut resp = http::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
