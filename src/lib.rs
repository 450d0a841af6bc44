//! # gatehouse
//!
//! An interceptor pipeline for unary RPC services.
//!
//! Every inbound call passes through an ordered [`Chain`] of interceptors
//! before it reaches its handler, and back out through the same chain in
//! reverse. Each interceptor owns one cross-cutting concern:
//!
//! - **Validation** — reject requests whose message fails its own checks
//! - **Recovery** — turn a panicking handler into an ordinary failure
//! - **Application errors** — send domain errors to the client as a status
//!   plus trailer metadata, and count them
//! - **Status normalisation** — never let an `Unknown` code escape
//! - **Metrics** — request counts, latency and failures per endpoint
//! - **Crash reporting** — hand unclassified failures to a reporter
//! - **Security** — derive an authenticated context from incoming metadata
//!
//! The [`Listener`] serves the wrapped handlers over HTTP with JSON bodies,
//! next to liveness and readiness probes.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gatehouse::metrics::Metrics;
//! use gatehouse::middleware::{
//!     ApplicationErrorInterceptor, MetricsInterceptor, RecoveryInterceptor,
//!     StatusInterceptor, ValidationInterceptor,
//! };
//! use gatehouse::{CallContext, Chain, Error, Listener, ListenerConfig, Message, Request, Routes};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct Input { value: String }
//! #[derive(Debug, serde::Serialize)]
//! struct Output { value: String }
//! impl Message for Input {}
//! impl Message for Output {}
//!
//! async fn shout(_ctx: CallContext, req: Request) -> Result<Output, Error> {
//!     let input = req.get::<Input>()?;
//!     Ok(Output { value: input.value.to_uppercase() })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = prometheus::Registry::new();
//!     let metrics = Metrics::new()?;
//!     metrics.register(&registry)?;
//!
//!     let chain = Chain::builder()
//!         .with(MetricsInterceptor::new(metrics.clone()))
//!         .with(StatusInterceptor)
//!         .with(ApplicationErrorInterceptor::new(metrics))
//!         .with(RecoveryInterceptor)
//!         .with(ValidationInterceptor)
//!         .build();
//!
//!     let routes = Routes::new().unary::<Input, Output, _>("/demo.Shouter/Shout", shout);
//!
//!     Listener::new(ListenerConfig::from_env()?, chain)
//!         .with_metrics(registry)
//!         .serve(routes)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod chain;
mod context;
mod error;
mod handler;
mod health;
mod message;
mod metadata;
pub mod metrics;
pub mod middleware;
mod router;
mod server;
mod status;

pub use chain::{Chain, ChainBuilder, Interceptor, Next, OrderViolation, Stage};
pub use context::{CallContext, Trailer};
pub use error::{ApplicationError, BoxError, ConfigError, Error, Panicked, ServeError, TrailerError};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, Outcome};
pub use health::{HealthReporter, ServingStatus};
pub use message::{AsAny, IntoResponse, Message, Request, Response, Validate, ValidationError};
pub use metadata::Metadata;
pub use router::Routes;
pub use server::{Listener, ListenerConfig, RunningListener};
pub use status::{Code, Status};
