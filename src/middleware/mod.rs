//! Built-in interceptors.
//!
//! Each stage owns exactly one cross-cutting concern. Install the ones you
//! need, outermost first, the way the [`chain`](crate::chain) module
//! documents:
//!
//! ```rust
//! use gatehouse::Chain;
//! use gatehouse::metrics::Metrics;
//! use gatehouse::middleware::{
//!     ApplicationErrorInterceptor, MetricsInterceptor, RecoveryInterceptor,
//!     StatusInterceptor, ValidationInterceptor,
//! };
//!
//! let metrics = Metrics::new().unwrap();
//! let chain = Chain::builder()
//!     .with(MetricsInterceptor::new(metrics.clone()))
//!     .with(StatusInterceptor)
//!     .with(ApplicationErrorInterceptor::new(metrics))
//!     .with(RecoveryInterceptor)
//!     .with(ValidationInterceptor)
//!     .build();
//! assert!(chain.check_order().is_ok());
//! ```
//!
//! | Stage | Before the call | After the call |
//! |---|---|---|
//! | [`validation`] | rejects invalid requests | — |
//! | [`recovery`] | — | turns panics into errors |
//! | [`application`] | — | writes trailer, counts application errors |
//! | [`status`] | — | `Unknown` → `Internal` |
//! | [`metrics`] | counts the request | latency, failures, log |
//! | [`crash_report`] | — | reports unclassified failures |
//! | [`security`] | rewrites the context | — |

pub mod application;
pub mod crash_report;
pub mod metrics;
pub mod recovery;
pub mod security;
pub mod status;
pub mod validation;

pub use application::ApplicationErrorInterceptor;
pub use crash_report::{CrashReport, CrashReportInterceptor, CrashReporter, TracingReporter};
pub use metrics::MetricsInterceptor;
pub use recovery::RecoveryInterceptor;
pub use security::SecurityInterceptor;
pub use status::StatusInterceptor;
pub use validation::ValidationInterceptor;
