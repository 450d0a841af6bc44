//! Request metrics and failure logging.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::error;

use crate::chain::{Interceptor, Next, Stage};
use crate::context::CallContext;
use crate::handler::BoxFuture;
use crate::message::Request;
use crate::metrics::Metrics;

/// Counts requests, times them, and logs and counts failures.
///
/// Application errors are not counted as failures here; the
/// [`application`](super::application) stage counts them on their own
/// family. Endpoints passed to [`exclude`](MetricsInterceptor::exclude) are
/// passed straight through with no metric or log side effects at all.
#[derive(Clone, Debug)]
pub struct MetricsInterceptor {
    metrics: Metrics,
    excluded: Arc<HashSet<String>>,
}

impl MetricsInterceptor {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics, excluded: Arc::new(HashSet::new()) }
    }

    /// Skips `endpoints` entirely (health checks, reflection, ...).
    pub fn exclude<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.excluded).extend(endpoints.into_iter().map(Into::into));
        self
    }
}

impl Interceptor for MetricsInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        if self.excluded.contains(ctx.endpoint()) {
            return next.run(ctx, req);
        }

        let metrics = self.metrics.clone();
        Box::pin(async move {
            let endpoint = ctx.endpoint().to_owned();
            let logged = req.clone();
            let start = Instant::now();

            metrics.inc_request(&endpoint);
            let outcome = next.run(ctx, req).await;
            metrics.observe_ms(&endpoint, start.elapsed().as_secs_f64() * 1000.0);

            if let Err(err) = &outcome {
                if !err.is_application() {
                    metrics.inc_failure(&endpoint);
                }
                error!(
                    endpoint = %endpoint,
                    request = ?logged,
                    error = %err,
                    "request failed on {endpoint}: {err}"
                );
            }
            outcome
        })
    }

    fn stage(&self) -> Stage {
        Stage::Metrics
    }
}
