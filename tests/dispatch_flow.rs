//! End-to-end tests for the handler-chain trampoline: phase ordering,
//! cancellation, failure recovery, and response finalization.

mod common;

use common::{context_with, record, steps, taken};
use http::StatusCode;
use slipway::{
    ErrorHandler, ErrorManager, ErrorPayload, HandlerChain, HttpError, RecordingTransport,
    RequestContext,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_phases_run_in_declared_order() {
    common::init_tracing();
    let log = steps();
    let chain = HandlerChain::builder()
        .pre(record(&log, "pre1"))
        .pre(record(&log, "pre2"))
        .main(record(&log, "main"))
        .post(record(&log, "post1"))
        .after_completion(record(&log, "after1"))
        .after_completion(record(&log, "after2"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert_eq!(taken(&log), ["pre1", "pre2", "main", "post1", "after1", "after2"]);
    assert!(ctx.is_completed());
    assert!(!ctx.is_canceled());
    assert!(!ctx.is_crashed());
    assert_eq!(sink.count(), 1);
    assert_eq!(sink.last().unwrap().status, StatusCode::OK);
}

#[test]
fn test_response_is_on_the_wire_before_after_completion_runs() {
    let sink = RecordingTransport::new();
    let probe = sink.clone();
    let writes_seen = Arc::new(AtomicUsize::new(usize::MAX));
    let seen = writes_seen.clone();

    let chain = HandlerChain::builder()
        .main(|ctx: &mut RequestContext| {
            ctx.set_response_body("done".to_string());
            Ok(())
        })
        .after_completion(move |_ctx: &mut RequestContext| {
            seen.store(probe.count(), Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap();

    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert_eq!(writes_seen.load(Ordering::SeqCst), 1);
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_cancel_during_main_skips_post_but_runs_after_completion() {
    let log = steps();
    let chain = HandlerChain::builder()
        .pre(record(&log, "pre"))
        .main({
            let log = log.clone();
            move |ctx: &mut RequestContext| {
                log.lock().push("main");
                ctx.accepted();
                ctx.cancel();
                Ok(())
            }
        })
        .post(record(&log, "post"))
        .after_completion(record(&log, "after"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert_eq!(taken(&log), ["pre", "main", "after"]);
    assert!(ctx.is_canceled());
    assert!(ctx.is_completed());
    // The response the main handler shaped still goes out.
    assert_eq!(sink.last().unwrap().status, StatusCode::ACCEPTED);
}

#[test]
fn test_cancel_during_pre_skips_main_and_post() {
    let log = steps();
    let chain = HandlerChain::builder()
        .pre({
            let log = log.clone();
            move |ctx: &mut RequestContext| {
                log.lock().push("pre");
                ctx.cancel();
                Ok(())
            }
        })
        .main(record(&log, "main"))
        .post(record(&log, "post"))
        .after_completion(record(&log, "after"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert_eq!(taken(&log), ["pre", "after"]);
    assert!(ctx.is_canceled());
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_cancel_during_post_has_no_effect() {
    let log = steps();
    let chain = HandlerChain::builder()
        .main(record(&log, "main"))
        .post({
            let log = log.clone();
            move |ctx: &mut RequestContext| {
                log.lock().push("post1");
                ctx.cancel();
                Ok(())
            }
        })
        .post(record(&log, "post2"))
        .after_completion(record(&log, "after"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert_eq!(taken(&log), ["main", "post1", "post2", "after"]);
    assert!(!ctx.is_canceled());
}

/// Custom error handler that counts how often it is consulted.
struct CountingHandler {
    hits: Arc<AtomicUsize>,
}

impl ErrorHandler for CountingHandler {
    fn handle_error(&self, error: &HttpError, ctx: &mut RequestContext) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        ctx.response_mut().set_status(error.status);
        ctx.response_mut().set_body(error.message.clone());
    }
}

#[test]
fn test_failure_with_recovery_dispatches_exactly_once() {
    let log = steps();
    let chain = HandlerChain::builder()
        .main({
            let log = log.clone();
            move |_ctx: &mut RequestContext| {
                log.lock().push("main");
                Err(anyhow::anyhow!("backend unavailable").into())
            }
        })
        .post(record(&log, "post"))
        .after_completion(record(&log, "after"))
        .build()
        .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let manager =
        ErrorManager::new().with_custom_handler(Box::new(CountingHandler { hits: hits.clone() }));

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &manager).unwrap();

    // Post is skipped, cleanup still runs, the handler saw the error once.
    assert_eq!(taken(&log), ["main", "after"]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(ctx.is_crashed());
    assert!(ctx.is_completed());
    assert_eq!(sink.last().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_panic_is_recovered_like_a_failure() {
    let log = steps();
    let chain = HandlerChain::builder()
        .main(|_ctx: &mut RequestContext| panic!("index out of bounds in handler"))
        .post(record(&log, "post"))
        .after_completion(record(&log, "after"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert_eq!(taken(&log), ["after"]);
    assert!(ctx.is_crashed());
    assert!(ctx.is_completed());
    assert_eq!(sink.last().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_failure_without_recovery_surfaces_but_still_finalizes() {
    let log = steps();
    let chain = HandlerChain::builder()
        .main(|_ctx: &mut RequestContext| Err(anyhow::anyhow!("boom").into()))
        .after_completion(record(&log, "after"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    let err = ctx.invoke(false, &ErrorManager::new()).unwrap_err();

    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.code, "internal_error");
    // Even surfaced failures finalize the response and run cleanup.
    assert_eq!(taken(&log), ["after"]);
    assert!(ctx.is_completed());
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_http_failure_renders_default_payload() {
    let chain = HandlerChain::builder()
        .main(|_ctx: &mut RequestContext| {
            Err(HttpError::not_found().with_message("order 42 does not exist").into())
        })
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    let wire = sink.last().unwrap();
    assert_eq!(wire.status, StatusCode::NOT_FOUND);
    let payload: ErrorPayload = serde_json::from_slice(&wire.body).unwrap();
    assert_eq!(payload.status, 404);
    assert_eq!(payload.error, "not_found");
    assert_eq!(payload.message, "order 42 does not exist");
}

#[test]
fn test_internal_failure_never_leaks_diagnostics() {
    let chain = HandlerChain::builder()
        .main(|_ctx: &mut RequestContext| {
            Err(anyhow::anyhow!("postgres://user:hunter2@db refused connection").into())
        })
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    let wire = sink.last().unwrap();
    assert_eq!(wire.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = std::str::from_utf8(&wire.body).unwrap();
    assert!(!body.contains("hunter2"), "diagnostics leaked: {body}");
    let payload: ErrorPayload = serde_json::from_slice(&wire.body).unwrap();
    assert_eq!(payload.error, "internal_error");
}

#[test]
fn test_no_content_clears_body_on_the_wire() {
    let chain = HandlerChain::builder()
        .main(|ctx: &mut RequestContext| {
            ctx.set_response_body("stale".to_string());
            ctx.no_content();
            Ok(())
        })
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    let wire = sink.last().unwrap();
    assert_eq!(wire.status, StatusCode::NO_CONTENT);
    assert!(wire.body.is_empty());
}

#[test]
fn test_after_completion_failure_is_contained() {
    let log = steps();
    let chain = HandlerChain::builder()
        .main(record(&log, "main"))
        .after_completion(|_ctx: &mut RequestContext| Err(anyhow::anyhow!("metrics flush failed").into()))
        .after_completion(record(&log, "after2"))
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    // The second cleanup handler still runs; the response is untouched.
    assert_eq!(taken(&log), ["main", "after2"]);
    assert!(!ctx.is_crashed());
    assert_eq!(sink.last().unwrap().status, StatusCode::OK);
}

#[test]
fn test_errors_raised_after_finalization_are_ignored() {
    let chain = HandlerChain::builder()
        .main(|_ctx: &mut RequestContext| Ok(()))
        .after_completion(|ctx: &mut RequestContext| {
            ctx.not_found();
            Ok(())
        })
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain, &sink);
    ctx.invoke(true, &ErrorManager::new()).unwrap();

    assert!(ctx.http_error().is_none());
    assert_eq!(sink.last().unwrap().status, StatusCode::OK);
}

#[test]
fn test_context_is_reusable_after_reset() {
    let chain = HandlerChain::builder()
        .main(|ctx: &mut RequestContext| {
            ctx.put("touched", true);
            Ok(())
        })
        .build()
        .unwrap();

    let sink = RecordingTransport::new();
    let mut ctx = context_with(chain.clone(), &sink);
    let first_id = ctx.context_id();
    ctx.invoke(true, &ErrorManager::new()).unwrap();
    assert!(ctx.is_completed());

    ctx.reset();
    ctx.prepare();
    assert_ne!(ctx.context_id(), first_id);
    assert!(ctx.get::<bool>("touched").is_none());

    ctx.activate(
        slipway::Request::new(http::Method::GET, "/again"),
        chain,
        Box::new(sink.clone()),
    );
    ctx.invoke(true, &ErrorManager::new()).unwrap();
    assert_eq!(sink.count(), 2);
}
