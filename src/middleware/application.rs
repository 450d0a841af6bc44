//! Application-error mapping.

use crate::chain::{Interceptor, Next, Stage};
use crate::context::CallContext;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::message::Request;
use crate::metrics::Metrics;

/// Delivers application errors to the client.
///
/// When the rest of the chain fails with an [`ApplicationError`], this stage
/// counts it on `grpc_request_application_error_count_total`, moves its
/// trailer fields into the call's outgoing trailer, and fails the call with
/// the error's own code and message. Other failures pass through untouched;
/// deciding their code is the [`status`](super::status) stage's job.
///
/// A trailer that cannot be written means the transport broke its side of
/// the contract, and the stage panics rather than drop the business status.
///
/// [`ApplicationError`]: crate::ApplicationError
#[derive(Clone, Debug)]
pub struct ApplicationErrorInterceptor {
    metrics: Metrics,
}

impl ApplicationErrorInterceptor {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

impl Interceptor for ApplicationErrorInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        let metrics = self.metrics.clone();
        Box::pin(async move {
            let call = ctx.clone();
            let err = match next.run(ctx, req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            let mut app = match err.application() {
                Some(app) => app.clone(),
                None => return Err(err),
            };

            metrics.inc_application_error(call.endpoint());

            if let Err(e) = call.trailer().merge(app.take_trailer()) {
                panic!("failed to encode error info: {e}");
            }

            Err(Error::Application(app))
        })
    }

    fn stage(&self) -> Stage {
        Stage::ApplicationError
    }
}
