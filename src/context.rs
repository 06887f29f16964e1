//! Per-request context and the handler-chain executor.
//!
//! A `RequestContext` is the single mutable unit of per-request state. It is
//! owned by exactly one thread of control from activation to completion, so
//! the cursor, attribute map, and response entity need no synchronization.
//! Instances are designed for pooling: `prepare()` assigns a fresh identity at
//! checkout, `reset()` clears every per-request field at return.
//!
//! Execution is an iterative trampoline over the chain's handler sequence
//! rather than recursive calls, so arbitrarily long chains never grow the call
//! stack, cancellation can short-circuit by moving the cursor, and the
//! after-completion phase is guaranteed to run.

use crate::binding::{BindRequest, ConverterService, SimpleConverter, plan_of};
use crate::chain::HandlerChain;
use crate::error::{BindError, DispatchError, HandlerError, HttpError};
use crate::media::MediaType;
use crate::recovery::ErrorManager;
use crate::request::Request;
use crate::response::ResponseEntity;
use crate::transport::{Transport, WireResponse};
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Mutable, poolable state for one in-flight request.
pub struct RequestContext {
    id: Uuid,
    request: Option<Request>,
    transport: Option<Box<dyn Transport>>,
    chain: Option<Arc<HandlerChain>>,
    cursor: usize,
    canceled: bool,
    completed: bool,
    crashed: bool,
    http_error: Option<HttpError>,
    internal_error: Option<anyhow::Error>,
    response: ResponseEntity,
    attributes: HashMap<String, Box<dyn Any + Send>>,
    converter: Arc<dyn ConverterService>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_attribute_capacity(8)
    }

    pub fn with_attribute_capacity(capacity: usize) -> Self {
        Self {
            id: Uuid::nil(),
            request: None,
            transport: None,
            chain: None,
            cursor: 0,
            canceled: false,
            completed: false,
            crashed: false,
            http_error: None,
            internal_error: None,
            response: ResponseEntity::default(),
            attributes: HashMap::with_capacity(capacity),
            converter: Arc::new(SimpleConverter),
        }
    }

    // ------------------------------------------------------------------
    // Pool lifecycle
    // ------------------------------------------------------------------

    /// Assign a fresh identity. Called by the pool at checkout, not at
    /// allocation: pooled instances are reused and only need an id when they
    /// become externally visible.
    pub fn prepare(&mut self) {
        self.id = Uuid::new_v4();
    }

    /// Clear every per-request field before the instance goes back to the
    /// pool. The converter is engine-level state and survives reset.
    pub fn reset(&mut self) {
        self.id = Uuid::nil();
        self.request = None;
        self.transport = None;
        self.chain = None;
        self.cursor = 0;
        self.canceled = false;
        self.completed = false;
        self.crashed = false;
        self.http_error = None;
        self.internal_error = None;
        self.response = ResponseEntity::default();
        self.attributes.clear();
    }

    /// Install the per-request collaborators and rewind the cursor.
    pub fn activate(
        &mut self,
        request: Request,
        chain: Arc<HandlerChain>,
        transport: Box<dyn Transport>,
    ) {
        self.request = Some(request);
        self.chain = Some(chain);
        self.transport = Some(transport);
        self.cursor = 0;
    }

    pub fn context_id(&self) -> Uuid {
        self.id
    }

    // ------------------------------------------------------------------
    // Request access
    // ------------------------------------------------------------------

    /// The buffered request.
    ///
    /// Panics if called before `activate`; a context never executes without a
    /// request installed.
    pub fn request(&self) -> &Request {
        self.request.as_ref().expect("context activated without a request")
    }

    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.path_variable(name))
    }

    pub fn request_parameter(&self, name: &str) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.query_parameter(name))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.request.as_ref().and_then(|r| r.header(name))
    }

    /// Bind the request onto a declared target type using its cached binding
    /// plan. Per-field conversion failures leave the field at its default;
    /// body deserialization failures are fatal.
    pub fn bind_request<T: BindRequest>(&self) -> Result<T, BindError> {
        plan_of::<T>().bind(self.request(), self.converter.as_ref())
    }

    pub(crate) fn set_converter(&mut self, converter: Arc<dyn ConverterService>) {
        self.converter = converter;
    }

    pub(crate) fn attach_app_context(&mut self, app: Arc<crate::engine::AppContext>) {
        if let Some(request) = self.request.as_mut() {
            request.set_app_context(app);
        }
    }

    // ------------------------------------------------------------------
    // Attribute map (single-owner, unsynchronized)
    // ------------------------------------------------------------------

    pub fn put(&mut self, key: impl Into<String>, value: impl Any + Send) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key).and_then(|v| v.downcast_ref())
    }

    // ------------------------------------------------------------------
    // Response shaping
    // ------------------------------------------------------------------

    pub fn response(&self) -> &ResponseEntity {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseEntity {
        &mut self.response
    }

    pub fn ok(&mut self) -> &mut Self {
        self.response.set_status(StatusCode::OK);
        self
    }

    pub fn created(&mut self, location: &str) -> &mut Self {
        self.response.set_status(StatusCode::CREATED);
        self.response.add_header("Location", location);
        self
    }

    pub fn accepted(&mut self) -> &mut Self {
        self.response.set_status(StatusCode::ACCEPTED);
        self
    }

    /// 204 with the body suppressed: a body is only ever written when set,
    /// and `no_content` clears any value a handler set earlier.
    pub fn no_content(&mut self) -> &mut Self {
        self.set_http_error(HttpError::no_content());
        self.response.clear_body();
        self
    }

    pub fn not_found(&mut self) -> &mut Self {
        self.set_http_error(HttpError::not_found());
        self
    }

    pub fn bad_request(&mut self) -> &mut Self {
        self.set_http_error(HttpError::bad_request());
        self
    }

    pub fn set_response_status(&mut self, status: StatusCode) -> &mut Self {
        self.response.set_status(status);
        self
    }

    pub fn set_response_body<B: Serialize + Send + 'static>(&mut self, body: B) -> &mut Self {
        self.response.set_body(body);
        self
    }

    pub fn set_response_content_type(&mut self, media: MediaType) -> &mut Self {
        self.response.set_content_type(media);
        self
    }

    pub fn add_response_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response.add_header(name, value);
        self
    }

    /// Record a structured HTTP error and align the response status with it.
    ///
    /// A no-op once the response has been finalized: errors raised by
    /// after-completion handlers cannot redirect the pipeline.
    pub fn set_http_error(&mut self, error: HttpError) {
        if self.completed {
            debug!(context = %self.id, code = error.error_code(), "ignoring error set after finalization");
            return;
        }
        self.response.set_status(error.status);
        self.http_error = Some(error);
    }

    /// Record an unexpected failure. Internal errors are never serialized to
    /// the client; the error manager renders a generic 5xx in their place.
    pub fn set_internal_error(&mut self, error: anyhow::Error) {
        if self.completed {
            debug!(context = %self.id, "ignoring internal error set after finalization");
            return;
        }
        self.response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        self.internal_error = Some(error);
    }

    pub fn http_error(&self) -> Option<&HttpError> {
        self.http_error.as_ref()
    }

    pub fn internal_error(&self) -> Option<&anyhow::Error> {
        self.internal_error.as_ref()
    }

    // ------------------------------------------------------------------
    // Execution state
    // ------------------------------------------------------------------

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    /// Cooperatively cancel the rest of the pre/main phase.
    ///
    /// Only effective while the cursor is still within the main phase; once
    /// past it (post or after-completion handlers, or a finalized response)
    /// the call has no effect. Cancellation never skips the after-completion
    /// phase.
    pub fn cancel(&mut self) {
        let Some(chain) = &self.chain else { return };
        if self.completed || self.cursor > chain.handler_index() {
            debug!(context = %self.id, cursor = self.cursor, "cancel after main phase has no effect");
            return;
        }
        self.canceled = true;
    }

    // ------------------------------------------------------------------
    // Trampoline
    // ------------------------------------------------------------------

    /// Run the chain to completion or cancellation.
    ///
    /// With `recovery_active`, any handler failure (an `Err` return or a
    /// panic) is routed to the error manager exactly once, the context is
    /// marked crashed, and the response is still finalized; the call then
    /// returns `Ok`. Without recovery the failure is additionally surfaced to
    /// the caller as a [`DispatchError`] after the same finalization and
    /// cleanup, so a request never ends without a response either way.
    pub fn invoke(
        &mut self,
        recovery_active: bool,
        errors: &ErrorManager,
    ) -> Result<(), DispatchError> {
        let Some(chain) = self.chain.clone() else {
            warn!(context = %self.id, "invoke without an activated chain");
            return Ok(());
        };

        let mut pending: Option<DispatchError> = None;

        while self.cursor <= chain.end_index() {
            let step = self.cursor;
            let in_cleanup = step >= chain.after_completion_start();
            let handler = Arc::clone(chain.handler(step));

            let outcome = if recovery_active {
                match panic::catch_unwind(AssertUnwindSafe(|| handler.as_ref()(self))) {
                    Ok(result) => result,
                    Err(payload) => Err(HandlerError::Internal(anyhow::anyhow!(
                        "handler panicked: {}",
                        panic_message(payload.as_ref())
                    ))),
                }
            } else {
                handler.as_ref()(self)
            };

            match outcome {
                Ok(()) => {
                    self.cursor = step + 1;
                    if self.canceled
                        && step <= chain.handler_index()
                        && self.cursor < chain.after_completion_start()
                    {
                        debug!(context = %self.id, step, "canceled; skipping to after-completion phase");
                        self.cursor = chain.after_completion_start();
                    }
                }
                Err(err) if in_cleanup => {
                    // After-completion failures are a cleanup concern only;
                    // the response is already on the wire.
                    warn!(
                        context = %self.id,
                        step,
                        code = err.error_code(),
                        error = %err,
                        "after-completion handler failed; contained"
                    );
                    self.cursor = step + 1;
                }
                Err(err) => {
                    self.crashed = true;
                    if !recovery_active {
                        pending = Some(DispatchError {
                            status: err.status(),
                            code: err.error_code(),
                        });
                    }
                    self.record_failure(step, err);
                    self.cursor = chain.after_completion_start();
                }
            }

            if self.cursor == chain.after_completion_start() && !self.completed {
                self.finalize(errors);
            }
        }

        match pending {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record_failure(&mut self, step: usize, err: HandlerError) {
        match err {
            HandlerError::Http(e) => {
                warn!(
                    context = %self.id,
                    step,
                    status = %e.status,
                    code = e.error_code(),
                    "handler failed with http error"
                );
                self.set_http_error(e);
            }
            HandlerError::Internal(e) => {
                error!(context = %self.id, step, error = %e, "handler failed with internal error");
                self.set_internal_error(e);
            }
        }
    }

    /// Dispatch any recorded error, write the response, and mark the flow
    /// complete. Runs exactly once, when the cursor reaches the
    /// after-completion boundary.
    fn finalize(&mut self, errors: &ErrorManager) {
        errors.dispatch(self);
        self.write_response();
        self.completed = true;
        debug!(
            context = %self.id,
            status = %self.response.status(),
            canceled = self.canceled,
            crashed = self.crashed,
            "request finalized"
        );
    }

    fn write_response(&mut self) {
        let wire = match self.response.to_wire() {
            Ok(wire) => wire,
            Err(err) => {
                // Serialization failed after the error-dispatch window; the
                // best we can still guarantee is an empty 500.
                error!(context = %self.id, error = %err, "response serialization failed");
                self.internal_error = Some(err);
                WireResponse {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    content_type: self.response.content_type(),
                    headers: Vec::new(),
                    body: Bytes::new(),
                }
            }
        };
        match self.transport.as_mut() {
            Some(transport) => transport.write(wire),
            None => debug!(context = %self.id, "no transport attached; response dropped"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
