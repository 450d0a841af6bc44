//! Request and response values.
//!
//! The pipeline never looks inside a message. It only needs to log it, hand it
//! to the handler, and ask whether it knows how to validate itself. Every
//! request and response type therefore implements [`Message`], usually with
//! an empty `impl` block:
//!
//! ```rust
//! use gatehouse::{Message, Validate, ValidationError};
//!
//! #[derive(Debug)]
//! struct Output { value: String }
//!
//! impl Message for Output {}
//!
//! #[derive(Debug)]
//! struct Input { value: String }
//!
//! impl Message for Input {
//!     fn validator(&self) -> Option<&dyn Validate> { Some(self) }
//! }
//!
//! impl Validate for Input {
//!     fn validate(&self, _strict: bool) -> Result<(), ValidationError> {
//!         if self.value.len() < 5 {
//!             return Err(ValidationError::new("value is too short"));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::status::Status;

/// Upcast helper so `dyn Message` can be downcast to its concrete type.
///
/// Blanket-implemented for every `'static` type; never implement it yourself.
pub trait AsAny: Any {
    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An application-defined request or response value.
pub trait Message: AsAny + fmt::Debug + Send + Sync {
    /// The validation capability of this message, if it has one.
    fn validator(&self) -> Option<&dyn Validate> {
        None
    }
}

/// Self-validation for request messages.
pub trait Validate {
    /// `strict` asks for the full rule set; the pipeline always passes `false`.
    fn validate(&self, strict: bool) -> Result<(), ValidationError>;
}

/// A failed [`Validate::validate`] check.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str { &self.message }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self { Self { message } }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self { Self::new(message) }
}

// ── Request / Response ────────────────────────────────────────────────────────

/// An incoming call's request value.
///
/// Cloning is one atomic increment: stages that log or report the request
/// after the handler ran keep their own handle.
#[derive(Clone)]
pub struct Request(Arc<dyn Message>);

impl Request {
    pub fn new<M: Message>(msg: M) -> Self {
        Self(Arc::new(msg))
    }

    pub fn message(&self) -> &dyn Message {
        &*self.0
    }

    /// Typed access to the request value.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        (*self.0).as_any().downcast_ref::<M>()
    }

    /// Like [`downcast_ref`](Request::downcast_ref), failing the call with
    /// `Internal` when the request is not an `M`.
    pub fn get<M: Message>(&self) -> Result<&M, Error> {
        self.downcast_ref::<M>().ok_or_else(|| {
            Status::internal(format!(
                "unexpected request type, wanted {}",
                std::any::type_name::<M>()
            ))
            .into()
        })
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// A successful call's response value.
#[derive(Clone)]
pub struct Response(Arc<dyn Message>);

impl Response {
    pub fn new<M: Message>(msg: M) -> Self {
        Self(Arc::new(msg))
    }

    pub fn message(&self) -> &dyn Message {
        &*self.0
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        (*self.0).as_any().downcast_ref::<M>()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Conversion of a handler's success value into a [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl<M: Message> IntoResponse for M {
    fn into_response(self) -> Response { Response::new(self) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    impl Message for Ping {}

    #[derive(Debug)]
    struct Pong;
    impl Message for Pong {}

    #[test]
    fn requests_downcast_to_their_concrete_type() {
        let req = Request::new(Ping(7));
        assert_eq!(req.downcast_ref::<Ping>(), Some(&Ping(7)));
        assert!(req.downcast_ref::<Pong>().is_none());
        assert_eq!(format!("{req:?}"), "Ping(7)");
    }

    #[test]
    fn wrong_request_type_is_an_internal_status() {
        let req = Request::new(Ping(1));
        let err = req.get::<Pong>().unwrap_err();
        assert_eq!(err.status().code(), crate::Code::Internal);
    }

    #[test]
    fn messages_without_validator_report_none() {
        assert!(Ping(0).validator().is_none());
    }
}
