//! Panic recovery.
//!
//! A panic inside the handler (or any stage inward of this one) unwinds up to
//! here and no further. It is logged with a backtrace and converted into an
//! ordinary failure:
//!
//! - a panic whose payload is an application error re-surfaces as that same
//!   application error, so outer stages treat it like a returned one;
//! - any other payload becomes an unclassified [`Panicked`] error reading
//!   `"<endpoint> panicked: <payload>"`.
//!
//! Without this stage a panic tears down the task serving the call.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures::FutureExt;
use tracing::error;

use crate::chain::{Interceptor, Next, Stage};
use crate::error::{ApplicationError, Error, Panicked};
use crate::context::CallContext;
use crate::handler::BoxFuture;
use crate::message::Request;

/// Catches panics from the rest of the chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecoveryInterceptor;

impl Interceptor for RecoveryInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        install_trace_hook();
        Box::pin(async move {
            let endpoint = ctx.endpoint().to_owned();
            let logged = req.clone();

            match AssertUnwindSafe(next.run(ctx, req)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let stack_trace = take_panic_trace().unwrap_or_else(Backtrace::force_capture);
                    let err = from_panic(&endpoint, payload);
                    error!(
                        endpoint = %endpoint,
                        request = ?logged,
                        stack_trace = %stack_trace,
                        "recovered a panic: {err}"
                    );
                    Err(err)
                }
            }
        })
    }

    fn stage(&self) -> Stage {
        Stage::Recovery
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static TRACE_HOOK: Once = Once::new();

/// Chains a panic hook that records the stack of the panicking frame.
///
/// The unwind reaches `catch_unwind` on the thread that panicked, so the
/// trace is parked in a thread-local until the recovery stage takes it.
fn install_trace_hook() {
    TRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            PANIC_TRACE.with(|trace| *trace.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<Backtrace> {
    PANIC_TRACE.with(|trace| trace.borrow_mut().take())
}

/// Converts a panic payload into the error the call fails with.
fn from_panic(endpoint: &str, payload: Box<dyn Any + Send>) -> Error {
    let payload = match payload.downcast::<ApplicationError>() {
        Ok(app) => return Error::Application(*app),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<Error>() {
        Ok(err) => {
            if let Some(app) = err.application() {
                return Error::Application(app.clone());
            }
            let message = err.to_string();
            return Error::new(Panicked::new(endpoint, message, Some(*err)));
        }
        Err(payload) => payload,
    };

    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    };
    Error::new(Panicked::new(endpoint, message, None))
}
