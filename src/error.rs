//! Error types.
//!
//! Two families live here:
//!
//! - [`Error`] — what a handler or an interceptor returns for a failed call.
//!   It is a tagged classification: an [`ApplicationError`] chosen by business
//!   code, an explicit transport [`Status`], or an unclassified error that the
//!   pipeline still has to assign a code to.
//! - [`ServeError`] / [`ConfigError`] — infrastructure failures of the
//!   listener: binding a port, reading configuration.

use std::error::Error as StdError;
use std::fmt;

use crate::metadata::Metadata;
use crate::status::{Code, Status};

/// A boxed, thread-safe error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

// ── ApplicationError ──────────────────────────────────────────────────────────

/// A failure already classified by business logic.
///
/// Its code, message and trailer fields are authoritative: the pipeline
/// forwards them to the client as-is.
///
/// ```rust
/// use gatehouse::{ApplicationError, Code};
///
/// let err = ApplicationError::new(Code::FailedPrecondition, "account is frozen")
///     .with_trailer("code", "ACCOUNT_FROZEN");
/// assert_eq!(err.trailer().get("code"), Some("ACCOUNT_FROZEN"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApplicationError {
    code: Code,
    message: String,
    trailer: Metadata,
}

impl ApplicationError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), trailer: Metadata::new() }
    }

    /// Adds a structured field delivered to the client as trailer metadata.
    pub fn with_trailer(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailer.append(key, value);
        self
    }

    pub fn code(&self) -> Code { self.code }
    pub fn message(&self) -> &str { &self.message }
    pub fn trailer(&self) -> &Metadata { &self.trailer }

    pub fn status(&self) -> Status {
        Status::new(self.code, self.message.clone())
    }

    /// Moves the trailer fields out, leaving the error with an empty trailer.
    pub(crate) fn take_trailer(&mut self) -> Metadata {
        std::mem::take(&mut self.trailer)
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ApplicationError {}

// ── Error ─────────────────────────────────────────────────────────────────────

/// The failure half of a call's outcome.
#[derive(Debug)]
pub enum Error {
    /// Business-classified failure; see [`ApplicationError`].
    Application(ApplicationError),
    /// An explicit status that did not come from business code (a
    /// normalised internal failure, a deadline set by the transport, ...).
    Status(Status),
    /// Anything else. Must be assigned a code before leaving the pipeline.
    Unclassified(BoxError),
}

impl Error {
    /// Wraps an arbitrary error, classifying it first.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_boxed(Box::new(err))
    }

    /// Restores a typed [`Error`] from a boxed one by downcasting.
    pub fn from_boxed(err: BoxError) -> Self {
        let err = match err.downcast::<Error>() {
            Ok(err) => return *err,
            Err(err) => err,
        };
        let err = match err.downcast::<ApplicationError>() {
            Ok(app) => return Self::Application(*app),
            Err(err) => err,
        };
        match err.downcast::<Status>() {
            Ok(status) => Self::Status(*status),
            Err(err) => Self::Unclassified(err),
        }
    }

    /// The application error this failure carries, if any.
    ///
    /// Unclassified errors are searched along their `source()` chain, so an
    /// application error wrapped by some other error type is still found.
    pub fn application(&self) -> Option<&ApplicationError> {
        match self {
            Self::Application(app) => Some(app),
            Self::Status(_) => None,
            Self::Unclassified(err) => {
                let first: &(dyn StdError + 'static) = &**err;
                let mut cur = Some(first);
                while let Some(e) = cur {
                    if let Some(app) = e.downcast_ref::<ApplicationError>() {
                        return Some(app);
                    }
                    if let Some(inner) = e.downcast_ref::<Error>() {
                        return inner.application();
                    }
                    cur = e.source();
                }
                None
            }
        }
    }

    pub fn is_application(&self) -> bool {
        self.application().is_some()
    }

    /// Canonical `{code, message}` for this failure.
    ///
    /// Classified errors yield their own code and message. An unclassified
    /// error takes the code of the first classified error on its `source()`
    /// chain and keeps its own message; with none found the code is
    /// [`Code::Unknown`].
    pub fn status(&self) -> Status {
        match self {
            Self::Application(app) => app.status(),
            Self::Status(status) => status.clone(),
            Self::Unclassified(err) => {
                let message = err.to_string();
                let first: &(dyn StdError + 'static) = &**err;
                let mut cur = Some(first);
                while let Some(e) = cur {
                    if let Some(app) = e.downcast_ref::<ApplicationError>() {
                        return Status::new(app.code(), message);
                    }
                    if let Some(status) = e.downcast_ref::<Status>() {
                        return Status::new(status.code(), message);
                    }
                    if let Some(inner) = e.downcast_ref::<Error>() {
                        return Status::new(inner.status().code(), message);
                    }
                    cur = e.source();
                }
                Status::new(Code::Unknown, message)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(app) => fmt::Display::fmt(app, f),
            Self::Status(status) => fmt::Display::fmt(status, f),
            Self::Unclassified(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Unclassified(err) => err.source(),
            _ => None,
        }
    }
}

impl From<ApplicationError> for Error {
    fn from(err: ApplicationError) -> Self { Self::Application(err) }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self { Self::Status(status) }
}

impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self { Self::from_boxed(err) }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self { Self::Unclassified(Box::new(err)) }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self { Self::Unclassified(Box::new(err)) }
}

impl From<String> for Error {
    fn from(msg: String) -> Self { Self::Unclassified(msg.into()) }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self { Self::Unclassified(msg.into()) }
}

// ── Panicked ──────────────────────────────────────────────────────────────────

/// A panic captured by the recovery stage and turned into an ordinary error.
#[derive(Debug, thiserror::Error)]
#[error("{endpoint} panicked: {message}")]
pub struct Panicked {
    endpoint: String,
    message: String,
    #[source]
    source: Option<Error>,
}

impl Panicked {
    pub(crate) fn new(endpoint: &str, message: String, source: Option<Error>) -> Self {
        Self { endpoint: endpoint.to_owned(), message, source }
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
    pub fn payload(&self) -> &str { &self.message }
}

// ── Infrastructure errors ─────────────────────────────────────────────────────

/// Writing the outgoing trailer failed.
#[derive(Debug, thiserror::Error)]
pub enum TrailerError {
    #[error("trailer already sent")]
    Sealed,
    #[error("invalid trailer key `{0}`")]
    InvalidKey(String),
    #[error("invalid value for trailer key `{0}`")]
    InvalidValue(String),
}

/// Reading listener configuration failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value `{value}` for {var}")]
    Invalid { var: &'static str, value: String },
}

/// The error type returned by the listener's fallible operations.
///
/// Per-call failures are [`Error`]s delivered to the client; this type only
/// surfaces failures to bind or configure the listener itself.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}
