//! Request validation.

use tracing::error;

use crate::chain::{Interceptor, Next, Stage};
use crate::context::CallContext;
use crate::error::ApplicationError;
use crate::handler::BoxFuture;
use crate::message::Request;
use crate::status::Code;

/// Rejects requests whose [`Validate`](crate::Validate) check fails.
///
/// The rest of the chain is not called; the call fails with an
/// `InvalidArgument` application error carrying the validation message and
/// no trailer fields. Requests without a validator pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationInterceptor;

impl Interceptor for ValidationInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        let checked = req.message().validator().map(|v| v.validate(false));

        if let Some(Err(err)) = checked {
            error!(
                endpoint = %ctx.endpoint(),
                request = ?req,
                "validation failed: {err}"
            );
            let failure = ApplicationError::new(Code::InvalidArgument, err.message());
            return Box::pin(async move { Err(failure.into()) });
        }

        next.run(ctx, req)
    }

    fn stage(&self) -> Stage {
        Stage::Validation
    }
}
