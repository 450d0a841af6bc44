//! Interceptors and the chain that composes them.
//!
//! An [`Interceptor`] wraps the rest of the chain, handed to it as a
//! [`Next`], and may act before and after it runs. A [`Chain`] is an ordered
//! list of interceptors; wrapping a handler with it yields a handler that
//! behaves as `I₀(I₁(…Iₙ(handler)))`. The first interceptor sees the call
//! first and the final outcome last.
//!
//! ```text
//!  call ──► I₀ ──► I₁ ──► … ──► Iₙ ──► handler
//!  outcome ◄── I₀ ◄── I₁ ◄── … ◄── Iₙ ◄──┘
//! ```
//!
//! # Ordering contract
//!
//! The built-in stages only compose correctly in one relative order
//! (outermost first):
//!
//! ```text
//! Metrics / CrashReport / Security   (anywhere)
//! Status                              outward of ApplicationError
//! ApplicationError                    outward of Recovery
//! Recovery                            outward of Validation and the handler
//! Validation
//! ```
//!
//! [`Chain::check_order`] verifies this for the stages it recognises.

use std::fmt;
use std::sync::Arc;

use crate::context::CallContext;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, Outcome};
use crate::message::Request;

/// The role an interceptor plays in the ordering contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Validation,
    Recovery,
    ApplicationError,
    Status,
    Metrics,
    CrashReport,
    Security,
    /// Any user-defined interceptor. Never part of the ordering check.
    Custom,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation       => "validation",
            Self::Recovery         => "recovery",
            Self::ApplicationError => "application-error",
            Self::Status           => "status",
            Self::Metrics          => "metrics",
            Self::CrashReport      => "crash-report",
            Self::Security         => "security",
            Self::Custom           => "custom",
        };
        f.write_str(name)
    }
}

/// A pipeline stage wrapping the rest of the chain.
///
/// `next` is consumed by [`Next::run`], so the rest of the chain runs at most
/// once per call. An interceptor that does not call it must produce the
/// outcome itself.
///
/// ```rust
/// use gatehouse::{BoxFuture, CallContext, Interceptor, Next, Request};
///
/// struct Tag;
///
/// impl Interceptor for Tag {
///     fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
///         Box::pin(async move {
///             tracing::debug!(endpoint = %ctx.endpoint(), "tagging");
///             next.run(ctx, req).await
///         })
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync + 'static {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture;

    fn stage(&self) -> Stage {
        Stage::Custom
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The remainder of the chain, from one interceptor's point of view.
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    handler: BoxedHandler,
}

impl Next {
    /// Runs the remaining interceptors and the handler.
    ///
    /// Nothing runs until the returned future is polled.
    pub fn run(self, ctx: CallContext, req: Request) -> BoxFuture {
        Box::pin(async move {
            match self.interceptors.get(self.index) {
                Some(interceptor) => {
                    let interceptor = Arc::clone(interceptor);
                    let next = Next {
                        interceptors: Arc::clone(&self.interceptors),
                        index: self.index + 1,
                        handler: self.handler,
                    };
                    interceptor.intercept(ctx, req, next).await
                }
                None => self.handler.call(ctx, req).await,
            }
        })
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered, immutable list of interceptors.
#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// A chain with no interceptors: wrapping returns the handler unchanged.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize { self.interceptors.len() }
    pub fn is_empty(&self) -> bool { self.interceptors.is_empty() }

    pub fn stages(&self) -> Vec<Stage> {
        self.interceptors.iter().map(|i| i.stage()).collect()
    }

    /// Composes the chain around `handler`.
    pub fn wrap(&self, handler: BoxedHandler) -> BoxedHandler {
        if self.interceptors.is_empty() {
            return handler;
        }
        Arc::new(Chained { interceptors: Arc::clone(&self.interceptors), handler })
    }

    /// Runs one call through the chain and `handler`.
    pub async fn call(&self, handler: impl Handler, ctx: CallContext, req: Request) -> Outcome {
        self.wrap(handler.into_boxed_handler()).call(ctx, req).await
    }

    /// Verifies the relative order of the built-in stages.
    pub fn check_order(&self) -> Result<(), OrderViolation> {
        // (outer, inner): `outer` must come before `inner` when both are present.
        const RULES: [(Stage, Stage); 4] = [
            (Stage::Status, Stage::ApplicationError),
            (Stage::Status, Stage::Recovery),
            (Stage::ApplicationError, Stage::Recovery),
            (Stage::Recovery, Stage::Validation),
        ];

        let stages = self.stages();
        let position = |stage: Stage| stages.iter().position(|s| *s == stage);

        for (outer, inner) in RULES {
            if let (Some(o), Some(i)) = (position(outer), position(inner)) {
                if o > i {
                    return Err(OrderViolation { outer, inner });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages()).finish()
    }
}

/// Two built-in stages installed in the wrong relative order.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("{outer} stage must be installed outward of the {inner} stage")]
pub struct OrderViolation {
    pub outer: Stage,
    pub inner: Stage,
}

/// Builder for [`Chain`]. Interceptors are added outermost first.
#[derive(Default)]
pub struct ChainBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ChainBuilder {
    pub fn with(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Chain {
        Chain { interceptors: self.interceptors.into() }
    }
}

/// A handler with the chain applied.
struct Chained {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    handler: BoxedHandler,
}

impl ErasedHandler for Chained {
    fn call(&self, ctx: CallContext, req: Request) -> BoxFuture {
        let next = Next {
            interceptors: Arc::clone(&self.interceptors),
            index: 0,
            handler: Arc::clone(&self.handler),
        };
        next.run(ctx, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::message::{Message, Response};
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Unit;
    impl Message for Unit {}

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        stage: Stage,
    }

    impl Interceptor for Record {
        fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
            let name = self.name;
            let log = Arc::clone(&self.log);
            Box::pin(async move {
                log.lock().push(format!("enter {name}"));
                let outcome = next.run(ctx, req).await;
                log.lock().push(format!("leave {name}"));
                outcome
            })
        }

        fn stage(&self) -> Stage {
            self.stage
        }
    }

    fn record(name: &'static str, log: &Arc<Mutex<Vec<String>>>, stage: Stage) -> Record {
        Record { name, log: Arc::clone(log), stage }
    }

    #[tokio::test]
    async fn first_interceptor_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .with(record("a", &log, Stage::Custom))
            .with(record("b", &log, Stage::Custom))
            .build();

        let handler_log = Arc::clone(&log);
        let handler = move |_ctx: CallContext, _req: Request| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().push("handler".to_owned());
                Ok::<_, Error>(Unit)
            }
        };

        chain.call(handler, CallContext::new("/t/Call"), Request::new(Unit)).await.unwrap();

        assert_eq!(
            *log.lock(),
            ["enter a", "enter b", "handler", "leave b", "leave a"]
        );
    }

    #[tokio::test]
    async fn empty_chain_runs_the_handler_directly() {
        let chain = Chain::empty();
        let out = chain
            .call(
                |_ctx: CallContext, _req: Request| async { Ok::<_, Error>(Response::new(Unit)) },
                CallContext::new("/t/Call"),
                Request::new(Unit),
            )
            .await
            .unwrap();
        assert!(out.downcast_ref::<Unit>().is_some());
    }

    #[test]
    fn order_check_accepts_the_documented_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .with(record("metrics", &log, Stage::Metrics))
            .with(record("status", &log, Stage::Status))
            .with(record("error", &log, Stage::ApplicationError))
            .with(record("recover", &log, Stage::Recovery))
            .with(record("validate", &log, Stage::Validation))
            .build();

        assert_eq!(chain.check_order(), Ok(()));
    }

    #[test]
    fn order_check_rejects_status_inward_of_application_errors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .with(record("error", &log, Stage::ApplicationError))
            .with(record("status", &log, Stage::Status))
            .build();

        assert_eq!(
            chain.check_order(),
            Err(OrderViolation { outer: Stage::Status, inner: Stage::ApplicationError })
        );
    }

    #[test]
    fn order_check_rejects_validation_outward_of_recovery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .with(record("validate", &log, Stage::Validation))
            .with(record("recover", &log, Stage::Recovery))
            .build();

        let err = chain.check_order().unwrap_err();
        assert_eq!(err.to_string(), "recovery stage must be installed outward of the validation stage");
    }
}
