//! Integration test common infrastructure.
//!
//! Helpers for building chains that record their execution order, activating
//! contexts against a recording transport, and inspecting what hit the wire.

use http::Method;
use parking_lot::Mutex;
use slipway::{
    HandlerChain, HandlerResult, RecordingTransport, Request, RequestContext,
};
use std::sync::Arc;

/// Shared execution-order log.
pub type Steps = Arc<Mutex<Vec<&'static str>>>;

#[allow(dead_code)]
pub fn steps() -> Steps {
    Arc::new(Mutex::new(Vec::new()))
}

#[allow(dead_code)]
pub fn taken(steps: &Steps) -> Vec<&'static str> {
    steps.lock().clone()
}

/// A handler that records its label and succeeds.
#[allow(dead_code)]
pub fn record(
    steps: &Steps,
    label: &'static str,
) -> impl Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static {
    let steps = steps.clone();
    move |_ctx| {
        steps.lock().push(label);
        Ok(())
    }
}

/// Prepare and activate a context over the given chain and transport.
#[allow(dead_code)]
pub fn context_with(chain: Arc<HandlerChain>, sink: &RecordingTransport) -> RequestContext {
    context_for(Request::new(Method::GET, "/test"), chain, sink)
}

#[allow(dead_code)]
pub fn context_for(
    request: Request,
    chain: Arc<HandlerChain>,
    sink: &RecordingTransport,
) -> RequestContext {
    let mut ctx = RequestContext::new();
    ctx.prepare();
    ctx.activate(request, chain, Box::new(sink.clone()));
    ctx
}

#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
