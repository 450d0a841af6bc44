//! Context augmentation from incoming metadata.

use std::sync::Arc;

use crate::chain::{Interceptor, Next, Stage};
use crate::context::CallContext;
use crate::handler::BoxFuture;
use crate::message::Request;
use crate::metadata::Metadata;

type AugmentFn = dyn Fn(CallContext, &Metadata) -> CallContext + Send + Sync;

/// Rewrites the call context from the incoming metadata before the call
/// continues inward.
///
/// The usual job is authentication: read a token from the metadata, resolve
/// it, and attach the principal as a context extension for the handler.
///
/// ```rust
/// use gatehouse::CallContext;
/// use gatehouse::middleware::SecurityInterceptor;
///
/// #[derive(Clone)]
/// struct UserId(String);
///
/// let security = SecurityInterceptor::new(|ctx: CallContext, md| {
///     match md.get("x-user-id") {
///         Some(id) => ctx.with_extension(UserId(id.to_owned())),
///         None => ctx,
///     }
/// });
/// ```
#[derive(Clone)]
pub struct SecurityInterceptor {
    augment: Arc<AugmentFn>,
}

impl SecurityInterceptor {
    pub fn new<F>(augment: F) -> Self
    where
        F: Fn(CallContext, &Metadata) -> CallContext + Send + Sync + 'static,
    {
        Self { augment: Arc::new(augment) }
    }
}

impl Interceptor for SecurityInterceptor {
    fn intercept(&self, ctx: CallContext, req: Request, next: Next) -> BoxFuture {
        let metadata = ctx.shared_metadata();
        let ctx = (self.augment)(ctx, &metadata);
        next.run(ctx, req)
    }

    fn stage(&self) -> Stage {
        Stage::Security
    }
}
