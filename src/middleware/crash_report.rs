//! Crash reporting.
//!
//! Failures nobody classified are bugs, and bugs belong in a crash-reporting
//! service. This stage hands them to a [`CrashReporter`] together with the
//! endpoint, the request and the acting user, then lets the failure continue
//! outward unchanged. Application errors are expected outcomes and are never
//! reported.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::error;

use crate::chain::{Interceptor, Next, Stage};
use crate::context::CallContext;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::message::Request;

/// One unclassified failure, as handed to a [`CrashReporter`].
#[derive(Debug)]
pub struct CrashReport<'a> {
    pub error: &'a Error,
    /// Free-form context: `endpoint` and `request` (its `Debug` rendering).
    pub extras: BTreeMap<&'static str, String>,
    pub user_id: Option<String>,
}

/// Client of an external crash-reporting service.
///
/// Called from every failing call concurrently; implementations must not
/// serialise unrelated calls.
pub trait CrashReporter: Send + Sync + 'static {
    fn capture(&self, report: CrashReport<'_>);
}

/// Reports crashes as structured `tracing` events.
///
/// Useful on its own in development, or as a fallback when no crash-reporting
/// service is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl CrashReporter for TracingReporter {
    fn capture(&self, report: CrashReport<'_>) {
        let none = String::new();
        error!(
            endpoint = %report.extras.get("endpoint").unwrap_or(&none),
            request = %report.extras.get("request").unwrap_or(&none),
            user_id = report.user_id.as_deref(),
            "crash report: {}",
            report.error
        );
    }
}

type UserIdFn = dyn Fn(&CallContext) -> Option<String> + Send + Sync;

/// Forwards unclassified failures to a [`CrashReporter`].
#[derive(Clone)]
pub struct CrashReportInterceptor {
    reporter: Arc<dyn CrashReporter>,
    user_id: Arc<UserIdFn>,
}

impl CrashReportInterceptor {
    /// `user_id` extracts the acting user from the call context, if known.
    pub fn new<R, F>(reporter: R, user_id: F) -> Self
    where
        R: CrashReporter,
        F: Fn(&CallContext) -> Option<String> + Send + Sync + 'static,
    {
        Self { reporter: Arc::new(reporter), user_id: Arc::new(user_id) }
    }
}

impl Interceptor for CrashReportInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        let reporter = Arc::clone(&self.reporter);
        let user_id = Arc::clone(&self.user_id);
        Box::pin(async move {
            let call = ctx.clone();
            let logged = req.clone();

            let err = match next.run(ctx, req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };
            if err.is_application() {
                return Err(err);
            }

            let mut extras = BTreeMap::new();
            extras.insert("endpoint", call.endpoint().to_owned());
            extras.insert("request", format!("{logged:?}"));

            reporter.capture(CrashReport { error: &err, extras, user_id: user_id(&call) });
            Err(err)
        })
    }

    fn stage(&self) -> Stage {
        Stage::CrashReport
    }
}
