//! Error dispatch and recovery.
//!
//! The error manager runs at exactly one point in a request's life: the
//! after-completion boundary (reached normally, by cancellation, or by the
//! recovery guard). It turns whatever error state the context accumulated
//! into the client-visible response. A custom handler, when registered, fully
//! supersedes the default for all HTTP errors; there is no per-status
//! selection.

use crate::context::RequestContext;
use crate::error::{ErrorKind, HttpError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Renders a structured HTTP error into the context's response.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &HttpError, ctx: &mut RequestContext);
}

/// Client-visible error body produced by the default handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub error: String,
    pub message: String,
}

/// Default error rendering: status from the error, a small structured payload
/// in the negotiated content type. `NoContent` suppresses the body entirely.
#[derive(Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle_error(&self, error: &HttpError, ctx: &mut RequestContext) {
        let response = ctx.response_mut();
        response.set_status(error.status);
        if error.kind == ErrorKind::NoContent {
            response.clear_body();
            return;
        }
        response.set_body(ErrorPayload {
            status: error.status.as_u16(),
            error: error.error_code().to_string(),
            message: error.message.clone(),
        });
    }
}

/// Owns the default error handler and an optional custom override.
pub struct ErrorManager {
    custom: Option<Box<dyn ErrorHandler>>,
    default_handler: DefaultErrorHandler,
}

impl Default for ErrorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorManager {
    pub fn new() -> Self {
        Self { custom: None, default_handler: DefaultErrorHandler }
    }

    /// Install a custom handler. It supersedes the default for every HTTP
    /// error; the policy is binary by design.
    pub fn with_custom_handler(mut self, handler: Box<dyn ErrorHandler>) -> Self {
        self.custom = Some(handler);
        self
    }

    pub fn has_custom_handler(&self) -> bool {
        self.custom.is_some()
    }

    /// Map the context's error state to a response.
    ///
    /// Internal errors take precedence: their diagnostics are logged
    /// server-side and the client sees only a generic 5xx payload. A context
    /// with no recorded error passes through untouched.
    pub(crate) fn dispatch(&self, ctx: &mut RequestContext) {
        let err = if let Some(internal) = ctx.internal_error() {
            error!(context = %ctx.context_id(), error = %internal, "internal error escalated to error manager");
            HttpError::internal("internal server error")
        } else if let Some(http) = ctx.http_error() {
            debug!(context = %ctx.context_id(), code = http.error_code(), "dispatching http error");
            http.clone()
        } else {
            return;
        };

        let handler: &dyn ErrorHandler = match &self.custom {
            Some(custom) => custom.as_ref(),
            None => &self.default_handler,
        };
        handler.handle_error(&err, ctx);
    }
}
