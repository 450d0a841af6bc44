//! Endpoint routing and message codecs.
//!
//! One exact path per unary method (`/package.Service/Method`), looked up in
//! a radix tree. Each route remembers how to decode its request type and
//! encode its response type; messages travel as JSON.

use std::sync::Arc;

use matchit::Router as MatchitRouter;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::chain::Chain;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler, WithDeadline};
use crate::message::{Message, Request, Response};
use crate::status::Status;

type Decode = fn(&[u8]) -> Result<Request, Error>;
type Encode = fn(&Response) -> Result<Vec<u8>, Error>;

/// One registered unary method.
#[derive(Clone)]
pub(crate) struct Method {
    pub(crate) handler: BoxedHandler,
    pub(crate) decode: Decode,
    pub(crate) encode: Encode,
}

/// The methods a listener serves.
///
/// Build it once at startup; pass it to [`Listener::start`](crate::Listener::start).
/// Each [`Routes::unary`] call returns `self` so registrations chain naturally.
#[derive(Default)]
pub struct Routes {
    tree: MatchitRouter<usize>,
    methods: Vec<Method>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unary method taking `I` and answering `O`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is registered twice or is not a valid route.
    ///
    /// ```rust,no_run
    /// # use gatehouse::{CallContext, Error, Message, Request, Routes};
    /// # #[derive(Debug, serde::Deserialize)] struct Input { value: String }
    /// # #[derive(Debug, serde::Serialize)] struct Output { value: String }
    /// # impl Message for Input {}
    /// # impl Message for Output {}
    /// async fn endpoint(_ctx: CallContext, req: Request) -> Result<Output, Error> {
    ///     let input = req.get::<Input>()?;
    ///     Ok(Output { value: input.value.to_uppercase() })
    /// }
    ///
    /// Routes::new().unary::<Input, Output, _>("/test.TestService/Endpoint", endpoint);
    /// ```
    pub fn unary<I, O, H>(mut self, path: &str, handler: H) -> Self
    where
        I: Message + DeserializeOwned,
        O: Message + Serialize,
        H: Handler,
    {
        self.tree
            .insert(path, self.methods.len())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self.methods.push(Method {
            handler: handler.into_boxed_handler(),
            decode: decode::<I>,
            encode: encode::<O>,
        });
        self
    }

    /// Applies `chain` to every handler, with the call deadline enforced
    /// innermost.
    pub(crate) fn into_table(self, chain: &Chain) -> MethodTable {
        let methods = self.methods
            .into_iter()
            .map(|m| Method { handler: chain.wrap(Arc::new(WithDeadline(m.handler))), ..m })
            .collect();
        MethodTable { tree: self.tree, methods }
    }
}

/// Routes with the interceptor chain applied, shared by all connections.
pub(crate) struct MethodTable {
    tree: MatchitRouter<usize>,
    methods: Vec<Method>,
}

impl MethodTable {
    pub(crate) fn lookup(&self, path: &str) -> Option<&Method> {
        let matched = self.tree.at(path).ok()?;
        self.methods.get(*matched.value)
    }
}

fn decode<I: Message + DeserializeOwned>(body: &[u8]) -> Result<Request, Error> {
    let msg: I = serde_json::from_slice(body)
        .map_err(|e| Status::internal(format!("failed to decode request: {e}")))?;
    Ok(Request::new(msg))
}

fn encode<O: Message + Serialize>(resp: &Response) -> Result<Vec<u8>, Error> {
    let msg = resp.downcast_ref::<O>().ok_or_else(|| {
        Status::internal(format!(
            "handler returned an unexpected response type, wanted {}",
            std::any::type_name::<O>()
        ))
    })?;
    serde_json::to_vec(msg)
        .map_err(|e| Status::internal(format!("failed to encode response: {e}")).into())
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routes").field("methods", &self.methods.len()).finish()
    }
}
