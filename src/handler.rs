//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A listener serves many endpoints, each with its own handler type, and the
//! interceptor chain has to wrap all of them the same way. Handlers are
//! therefore stored behind a trait object (`dyn ErasedHandler`) that hides the
//! concrete function type.
//!
//! ```text
//! async fn endpoint(ctx, req) -> Result<Output, Error> { … }  ← user writes this
//!        ↓ routes.unary(path, endpoint)
//! endpoint.into_boxed_handler()                              ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(endpoint))                              ← stored as BoxedHandler
//!        ↓ chain.wrap(handler)
//! interceptors … → handler.call(ctx, req)                    ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::CallContext;
use crate::error::Error;
use crate::message::{IntoResponse, Request, Response};
use crate::status::Status;

/// What a call produces: a response, or exactly one error.
pub type Outcome = Result<Response, Error>;

/// A heap-allocated, type-erased future that resolves to an [`Outcome`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the public [`BoxedHandler`]
/// alias; interceptors and the listener call through it.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: CallContext, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent calls.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid endpoint handler.
///
/// You never implement this yourself. It is satisfied by any function with
/// the signature:
///
/// ```text
/// async fn name(ctx: CallContext, req: Request) -> Result<impl IntoResponse, Error>
/// ```
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(CallContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(CallContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(CallContext, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ctx: CallContext, req: Request) -> BoxFuture {
        let fut = (self.0)(ctx, req);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}

/// Fails the wrapped handler with `DeadlineExceeded` once the call's deadline
/// passes.
///
/// Sits at the terminal position, inside every interceptor, so the failure
/// travels back out through the whole chain.
pub(crate) struct WithDeadline(pub(crate) BoxedHandler);

impl ErasedHandler for WithDeadline {
    fn call(&self, ctx: CallContext, req: Request) -> BoxFuture {
        let Some(deadline) = ctx.deadline() else {
            return self.0.call(ctx, req);
        };
        let call = self.0.call(ctx, req);
        Box::pin(async move {
            match tokio::time::timeout_at(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Status::deadline_exceeded("deadline exceeded").into()),
            }
        })
    }
}
