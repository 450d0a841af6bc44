//! Status normalisation.

use crate::chain::{Interceptor, Next, Stage};
use crate::context::CallContext;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::message::Request;
use crate::status::{Code, Status};

/// Guarantees no failure leaves the pipeline as `Unknown`.
///
/// A failure whose canonical status is `Unknown` (nothing classified it) is
/// replaced by `Internal` with the original message. Application errors and
/// explicit statuses pass through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusInterceptor;

impl Interceptor for StatusInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            match next.run(ctx, req).await {
                Ok(resp) => Ok(resp),
                Err(err) => Err(normalize(err)),
            }
        })
    }

    fn stage(&self) -> Stage {
        Stage::Status
    }
}

fn normalize(err: Error) -> Error {
    if err.is_application() {
        return err;
    }
    let status = err.status();
    if status.code() == Code::Unknown {
        return Error::Status(Status::new(Code::Internal, status.message()));
    }
    err
}
