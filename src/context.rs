//! Per-call context.

use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::TrailerError;
use crate::metadata::{self, Metadata};

/// Everything the pipeline knows about one inbound call besides the request.
///
/// Created by the transport, handed by value from stage to stage, dropped
/// when the call completes. Cloning is cheap: the endpoint, metadata and
/// extensions are shared, and every clone writes to the same [`Trailer`].
#[derive(Clone, Debug)]
pub struct CallContext {
    endpoint: Arc<str>,
    metadata: Arc<Metadata>,
    trailer: Trailer,
    extensions: Arc<Extensions>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context for a call to `endpoint` (e.g. `"/pkg.Service/Method"`).
    pub fn new(endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            endpoint: endpoint.into(),
            metadata: Arc::new(Metadata::new()),
            trailer: Trailer::default(),
            extensions: Arc::new(Extensions::new()),
            deadline: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attaches a typed value (an authenticated principal, a tenant id, ...)
    /// for stages further in and for the handler.
    pub fn with_extension<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.extensions).insert(value);
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
    pub fn metadata(&self) -> &Metadata { &self.metadata }
    pub fn trailer(&self) -> &Trailer { &self.trailer }
    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    pub(crate) fn shared_metadata(&self) -> Arc<Metadata> {
        Arc::clone(&self.metadata)
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Time left before the deadline; `None` when the call has none.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}

// ── Trailer ───────────────────────────────────────────────────────────────────

/// The outgoing trailer of one call.
///
/// Shared by every clone of the call's [`CallContext`]. The transport seals
/// it once the chain has returned; writes after that fail.
#[derive(Clone, Debug, Default)]
pub struct Trailer {
    inner: Arc<Mutex<TrailerState>>,
}

#[derive(Debug, Default)]
struct TrailerState {
    fields: Metadata,
    sealed: bool,
}

impl Trailer {
    /// Appends every field of `fields`. Either all fields are written or none.
    pub fn merge(&self, fields: Metadata) -> Result<(), TrailerError> {
        for (key, value) in fields.iter() {
            if !metadata::is_valid_trailer_key(key) {
                return Err(TrailerError::InvalidKey(key.to_owned()));
            }
            if !metadata::is_valid_value(value) {
                return Err(TrailerError::InvalidValue(key.to_owned()));
            }
        }

        let mut state = self.inner.lock();
        if state.sealed {
            return Err(TrailerError::Sealed);
        }
        state.fields.extend(fields);
        Ok(())
    }

    /// Copy of the fields written so far.
    pub fn snapshot(&self) -> Metadata {
        self.inner.lock().fields.clone()
    }

    /// Closes the trailer and returns its fields.
    pub(crate) fn seal(&self) -> Metadata {
        let mut state = self.inner.lock();
        state.sealed = true;
        std::mem::take(&mut state.fields)
    }
}
