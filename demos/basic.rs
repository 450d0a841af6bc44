//! Minimal gatehouse service: one unary method behind the full interceptor chain.
//!
//! Run with:
//!   GATEHOUSE_PORT=50051 RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i -X POST http://localhost:50051/demo.Shouter/Shout \
//!        -H 'x-user-id: alice' -d '{"value":"hello"}'
//!   curl -i -X POST http://localhost:50051/demo.Shouter/Shout -d '{"value":"hi"}'
//!   curl -i -X POST http://localhost:50051/demo.Shouter/Shout -d '{"value":"forbidden"}'
//!   curl -i -X POST http://localhost:50051/demo.Shouter/Shout -d '{"value":"panic!"}'
//!   curl http://localhost:50051/readyz
//!   curl http://localhost:50051/metrics

use gatehouse::metrics::Metrics;
use gatehouse::middleware::{
    ApplicationErrorInterceptor, CrashReportInterceptor, MetricsInterceptor, RecoveryInterceptor,
    SecurityInterceptor, StatusInterceptor, TracingReporter, ValidationInterceptor,
};
use gatehouse::{
    ApplicationError, CallContext, Chain, Code, Error, Listener, ListenerConfig, Message, Metadata,
    Request, Routes, Validate, ValidationError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct Input {
    value: String,
}

impl Message for Input {
    fn validator(&self) -> Option<&dyn Validate> {
        Some(self)
    }
}

impl Validate for Input {
    fn validate(&self, _strict: bool) -> Result<(), ValidationError> {
        if self.value.len() < 5 {
            return Err(ValidationError::new("value is too short"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Output {
    value: String,
    caller: Option<String>,
}

impl Message for Output {}

#[derive(Clone, Debug)]
struct Caller(String);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let registry = prometheus::Registry::new();
    let metrics = Metrics::new()?;
    metrics.register(&registry)?;

    let chain = Chain::builder()
        .with(MetricsInterceptor::new(metrics.clone()).exclude(["/grpc.health.v1.Health/Check"]))
        .with(SecurityInterceptor::new(authenticate))
        .with(StatusInterceptor)
        .with(CrashReportInterceptor::new(TracingReporter, |ctx: &CallContext| {
            ctx.extension::<Caller>().map(|c| c.0.clone())
        }))
        .with(ApplicationErrorInterceptor::new(metrics))
        .with(RecoveryInterceptor)
        .with(ValidationInterceptor)
        .build();

    let routes = Routes::new().unary::<Input, Output, _>("/demo.Shouter/Shout", shout);

    Listener::new(ListenerConfig::from_env()?, chain)
        .with_metrics(registry)
        .serve(routes)
        .await?;
    Ok(())
}

fn authenticate(ctx: CallContext, md: &Metadata) -> CallContext {
    match md.get("x-user-id") {
        Some(id) => ctx.with_extension(Caller(id.to_owned())),
        None => ctx,
    }
}

async fn shout(ctx: CallContext, req: Request) -> Result<Output, Error> {
    let input = req.get::<Input>()?;

    match input.value.as_str() {
        "forbidden" => Err(ApplicationError::new(Code::PermissionDenied, "shouting is not allowed")
            .with_trailer("code", "SHOUT_FORBIDDEN")
            .into()),
        "panic!" => panic!("asked to panic"),
        value => Ok(Output {
            value: value.to_uppercase(),
            caller: ctx.extension::<Caller>().map(|c| c.0.clone()),
        }),
    }
}
