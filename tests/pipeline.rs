use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gatehouse::metrics::Metrics;
use gatehouse::middleware::{
    ApplicationErrorInterceptor, CrashReport, CrashReportInterceptor, CrashReporter,
    MetricsInterceptor, RecoveryInterceptor, SecurityInterceptor, StatusInterceptor,
    ValidationInterceptor,
};
use gatehouse::{
    ApplicationError, CallContext, Chain, Code, Error, Message, Metadata, Request, Validate,
    ValidationError,
};
use parking_lot::Mutex;
use tracing_test::traced_test;

// ── Fixtures ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
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

#[derive(Debug, PartialEq)]
struct Output {
    value: String,
}

impl Message for Output {}

#[derive(Clone, Debug, PartialEq)]
struct UserId(String);

#[derive(Clone, Default)]
struct Recorder {
    reports: Arc<Mutex<Vec<(String, String, Option<String>)>>>,
}

impl CrashReporter for Recorder {
    fn capture(&self, report: CrashReport<'_>) {
        let endpoint = report.extras.get("endpoint").cloned().unwrap_or_default();
        self.reports.lock().push((endpoint, report.error.to_string(), report.user_id));
    }
}

fn request(value: &str) -> Request {
    Request::new(Input { value: value.to_owned() })
}

fn context(endpoint: &str) -> CallContext {
    CallContext::new(endpoint).with_metadata(Metadata::new().with("x-user-id", "user-7"))
}

/// The recommended production chain, outermost first.
fn full_chain(metrics: &Metrics, reporter: Recorder) -> Chain {
    Chain::builder()
        .with(MetricsInterceptor::new(metrics.clone()))
        .with(SecurityInterceptor::new(|ctx: CallContext, md: &Metadata| {
            match md.get("x-user-id") {
                Some(id) => ctx.with_extension(UserId(id.to_owned())),
                None => ctx,
            }
        }))
        .with(StatusInterceptor)
        .with(CrashReportInterceptor::new(reporter, |ctx: &CallContext| {
            ctx.extension::<UserId>().map(|u| u.0.clone())
        }))
        .with(ApplicationErrorInterceptor::new(metrics.clone()))
        .with(RecoveryInterceptor)
        .with(ValidationInterceptor)
        .build()
}

async fn echo(_ctx: CallContext, req: Request) -> Result<Output, Error> {
    Ok(Output { value: req.get::<Input>()?.value.clone() })
}

async fn fail_with_application_error(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    Err(ApplicationError::new(Code::InvalidArgument, "Failed")
        .with_trailer("code", "APPLICATION_ERROR")
        .into())
}

async fn fail_randomly(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    Err("random error".into())
}

async fn panic_with_str(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    panic!("boom");
}

async fn panic_with_application_error(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    std::panic::panic_any(
        ApplicationError::new(Code::FailedPrecondition, "not yet")
            .with_trailer("code", "PANICKED_APPLICATION_ERROR"),
    );
}

async fn greet(_ctx: CallContext, req: Request) -> Result<Output, Error> {
    req.get::<Input>()?;
    Ok(Output { value: "World".to_owned() })
}

async fn panic_with_error(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    std::panic::panic_any(Error::from("panic"));
}

#[inline(never)]
fn charge_card_fault() {
    panic!("card service returned garbage");
}

async fn panic_deep_inside(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    charge_card_fault();
    Ok(Output { value: String::new() })
}

async fn fail_with_bad_trailer(_ctx: CallContext, _req: Request) -> Result<Output, Error> {
    Err(ApplicationError::new(Code::InvalidArgument, "Failed")
        .with_trailer("bad key", "APPLICATION_ERROR")
        .into())
}

async fn whoami(ctx: CallContext, _req: Request) -> Result<Output, Error> {
    let user = ctx.extension::<UserId>().map(|u| u.0.clone()).unwrap_or_default();
    Ok(Output { value: user })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_call_passes_through_every_stage() {
    let metrics = Metrics::new().unwrap();
    let recorder = Recorder::default();
    let chain = full_chain(&metrics, recorder.clone());
    assert!(chain.check_order().is_ok());

    let ctx = context("/test.Service/Echo");
    let resp = chain.call(greet, ctx.clone(), request("Hello")).await.unwrap();

    assert_eq!(resp.downcast_ref::<Output>(), Some(&Output { value: "World".into() }));
    assert_eq!(metrics.request_count("/test.Service/Echo"), 1);
    assert_eq!(metrics.latency_count("/test.Service/Echo"), 1);
    assert_eq!(metrics.failure_count("/test.Service/Echo"), 0);
    assert_eq!(metrics.application_error_count("/test.Service/Echo"), 0);
    assert!(ctx.trailer().snapshot().is_empty());
    assert!(recorder.reports.lock().is_empty());
}

#[tokio::test]
async fn application_error_becomes_status_and_trailer() {
    let metrics = Metrics::new().unwrap();
    let recorder = Recorder::default();
    let chain = full_chain(&metrics, recorder.clone());

    let ctx = context("/test.Service/Fail");
    let err = chain
        .call(fail_with_application_error, ctx.clone(), request("Hello"))
        .await
        .unwrap_err();

    let status = err.status();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "Failed");
    assert_eq!(ctx.trailer().snapshot().get("code"), Some("APPLICATION_ERROR"));

    assert_eq!(metrics.request_count("/test.Service/Fail"), 1);
    assert_eq!(metrics.application_error_count("/test.Service/Fail"), 1);
    assert_eq!(metrics.failure_count("/test.Service/Fail"), 0);
    assert!(recorder.reports.lock().is_empty());
}

#[tokio::test]
#[traced_test]
async fn unclassified_error_is_internal_and_reported() {
    let metrics = Metrics::new().unwrap();
    let recorder = Recorder::default();
    let chain = full_chain(&metrics, recorder.clone());

    let err = chain
        .call(fail_randomly, context("/test.Service/Random"), request("Hello"))
        .await
        .unwrap_err();

    let status = err.status();
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "random error");

    assert_eq!(metrics.failure_count("/test.Service/Random"), 1);
    assert_eq!(metrics.application_error_count("/test.Service/Random"), 0);
    assert!(logs_contain("request failed on /test.Service/Random"));

    let reports = recorder.reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "/test.Service/Random");
    assert_eq!(reports[0].1, "random error");
    assert_eq!(reports[0].2.as_deref(), Some("user-7"));
}

#[tokio::test]
#[traced_test]
async fn recovered_panic_names_the_endpoint() {
    let metrics = Metrics::new().unwrap();
    let recorder = Recorder::default();
    let chain = full_chain(&metrics, recorder.clone());

    let err = chain
        .call(panic_with_str, context("/test.Service/Panic"), request("Hello"))
        .await
        .unwrap_err();

    let status = err.status();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("/test.Service/Panic"));
    assert!(status.message().contains("boom"));

    assert!(logs_contain("recovered a panic"));
    assert_eq!(metrics.failure_count("/test.Service/Panic"), 1);
    assert_eq!(recorder.reports.lock().len(), 1);
}

#[tokio::test]
async fn recovered_error_panic_names_the_endpoint() {
    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    let err = chain
        .call(panic_with_error, context("/test.Service/PanicErr"), request("Hello"))
        .await
        .unwrap_err();

    assert!(!err.is_application());
    assert_eq!(err.status().code(), Code::Internal);
    assert_eq!(err.status().message(), "/test.Service/PanicErr panicked: panic");
}

#[tokio::test]
async fn panic_without_recovery_tears_down_the_task() {
    let chain = Chain::builder().with(StatusInterceptor).build();

    let handle = tokio::spawn(async move {
        chain.call(panic_with_str, context("/test.Service/Panic"), request("Hello")).await
    });

    let joined = handle.await;
    assert!(joined.is_err_and(|e| e.is_panic()));
}

#[tokio::test]
async fn panicked_application_error_keeps_its_trailer() {
    let metrics = Metrics::new().unwrap();
    let recorder = Recorder::default();
    let chain = full_chain(&metrics, recorder.clone());

    let ctx = context("/test.Service/PanicApp");
    let err = chain
        .call(panic_with_application_error, ctx.clone(), request("Hello"))
        .await
        .unwrap_err();

    assert!(err.is_application());
    assert_eq!(err.status().code(), Code::FailedPrecondition);
    assert_eq!(err.status().message(), "not yet");
    assert_eq!(ctx.trailer().snapshot().get("code"), Some("PANICKED_APPLICATION_ERROR"));
    assert_eq!(metrics.application_error_count("/test.Service/PanicApp"), 1);
    assert!(recorder.reports.lock().is_empty());
}

#[tokio::test]
#[traced_test]
async fn invalid_request_never_reaches_the_handler() {
    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let handler = move |ctx: CallContext, req: Request| {
        counted.fetch_add(1, Ordering::SeqCst);
        echo(ctx, req)
    };

    let ctx = context("/test.Service/Echo");
    let err = chain.call(handler, ctx.clone(), request("Hi")).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(err.status().code(), Code::InvalidArgument);
    assert_eq!(err.status().message(), "value is too short");
    assert!(ctx.trailer().snapshot().is_empty());
    assert!(logs_contain("validation failed: value is too short"));

    // A rejected request is an application error, not a failure.
    assert_eq!(metrics.application_error_count("/test.Service/Echo"), 1);
    assert_eq!(metrics.failure_count("/test.Service/Echo"), 0);
}

#[tokio::test]
async fn excluded_endpoints_are_not_measured() {
    let metrics = Metrics::new().unwrap();
    let chain = Chain::builder()
        .with(MetricsInterceptor::new(metrics.clone()).exclude(["/grpc.health.v1.Health/Check"]))
        .build();

    let err = chain
        .call(fail_randomly, context("/grpc.health.v1.Health/Check"), request("Hello"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "random error");
    assert_eq!(metrics.request_count("/grpc.health.v1.Health/Check"), 0);
    assert_eq!(metrics.failure_count("/grpc.health.v1.Health/Check"), 0);
    assert_eq!(metrics.latency_count("/grpc.health.v1.Health/Check"), 0);
}

#[tokio::test]
async fn security_stage_context_reaches_the_handler() {
    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    let resp = chain
        .call(whoami, context("/test.Service/WhoAmI"), request("Hello"))
        .await
        .unwrap();
    assert_eq!(resp.downcast_ref::<Output>(), Some(&Output { value: "user-7".into() }));

    let anonymous = CallContext::new("/test.Service/WhoAmI");
    let resp = chain.call(whoami, anonymous, request("Hello")).await.unwrap();
    assert_eq!(resp.downcast_ref::<Output>(), Some(&Output { value: String::new() }));
}

#[tokio::test]
async fn calls_on_different_endpoints_are_counted_separately() {
    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    for _ in 0..3 {
        chain.call(echo, context("/test.Service/A"), request("Hello")).await.unwrap();
    }
    chain.call(echo, context("/test.Service/B"), request("Hello")).await.unwrap();

    assert_eq!(metrics.request_count("/test.Service/A"), 3);
    assert_eq!(metrics.request_count("/test.Service/B"), 1);
}

#[tokio::test]
#[traced_test]
async fn recovered_panic_logs_the_faulting_frame() {
    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    chain
        .call(panic_deep_inside, context("/test.Service/Charge"), request("Hello"))
        .await
        .unwrap_err();

    assert!(logs_contain("charge_card_fault"));
}

#[tokio::test]
async fn unwritable_trailer_is_fatal() {
    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    let handle = tokio::spawn(async move {
        chain.call(fail_with_bad_trailer, context("/test.Service/Fail"), request("Hello")).await
    });

    let panic = handle.await.unwrap_err().into_panic();
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or_default();
    assert!(message.contains("failed to encode error info"), "{message}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_all_counted() {
    const CALLS: u64 = 64;

    let metrics = Metrics::new().unwrap();
    let chain = full_chain(&metrics, Recorder::default());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..CALLS {
        let chain = chain.clone();
        tasks.spawn(async move {
            let ctx = context("/test.Service/Busy");
            if i % 2 == 0 {
                chain.call(fail_randomly, ctx, request("Hello")).await
            } else {
                chain.call(greet, ctx, request("Hello")).await
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let _ = joined.unwrap();
    }

    assert_eq!(metrics.request_count("/test.Service/Busy"), CALLS);
    assert_eq!(metrics.latency_count("/test.Service/Busy"), CALLS);
    assert_eq!(metrics.failure_count("/test.Service/Busy"), CALLS / 2);
}
