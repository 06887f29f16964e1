//! Unified error handling for slipway.
//!
//! Two families of failure flow through the dispatch core: structured HTTP
//! errors (intentional, user-visible, carry a status classification) and
//! internal errors (unexpected, opaque `anyhow::Error`, never serialized to
//! the client). Binding and resolution have their own narrow error types that
//! escalate into one of the two families at the handler boundary.

use crate::media::MediaType;
use http::StatusCode;
use thiserror::Error;

// ============================================================================
// HTTP errors (intentional, client-visible)
// ============================================================================

/// Classification of a structured HTTP error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    NoContent,
    MethodNotAllowed,
    UnsupportedMedia,
    Internal,
}

/// A structured, intentional HTTP failure: status code plus classification.
///
/// Distinct from internal errors, which represent unexpected failures with no
/// inherent HTTP semantics.
#[derive(Debug, Clone, Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into() }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorKind::NotFound, "resource not found")
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::BadRequest, "bad request")
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, ErrorKind::NoContent, "no content")
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::MethodNotAllowed,
            "method not allowed",
        )
    }

    pub fn unsupported_media() -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::UnsupportedMedia,
            "unsupported media type",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal, message)
    }

    /// Replace the human-readable message, keeping status and kind.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self.kind {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NoContent => "no_content",
            ErrorKind::MethodNotAllowed => "method_not_allowed",
            ErrorKind::UnsupportedMedia => "unsupported_media",
            ErrorKind::Internal => "internal_error",
        }
    }
}

// ============================================================================
// Handler errors (what a chain step can fail with)
// ============================================================================

/// Errors a chain handler can fail with.
///
/// `Http` is an intentional failure that becomes the response; `Internal` is
/// an unexpected one that the recovery guard normalizes into a generic 5xx.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("http error: {0}")]
    Http(#[from] HttpError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http(e) => e.error_code(),
            Self::Internal(_) => "internal_error",
        }
    }

    /// Status the failure maps to on the wire.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ResolveError> for HandlerError {
    fn from(err: ResolveError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<BindError> for HandlerError {
    fn from(err: BindError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

/// Result type for chain handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Error returned by `invoke` when recovery is disabled and a handler failed.
///
/// The full failure stays recorded on the context (and the response has still
/// been finalized); this is the caller-facing summary.
#[derive(Debug, Error)]
#[error("handler chain failed: {code} ({status})")]
pub struct DispatchError {
    pub status: StatusCode,
    pub code: &'static str,
}

// ============================================================================
// Binding and resolution errors
// ============================================================================

/// Errors raised while binding a request onto a target type.
///
/// Per-field conversion problems are swallowed at the field level and never
/// surface here; only structural failures do.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("failed to deserialize {media} body: {source}")]
    Body {
        media: MediaType,
        source: anyhow::Error,
    },

    #[error("no binding plan registered for {0}")]
    NotRegistered(&'static str),
}

impl BindError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Body { .. } => "body_deserialize",
            Self::NotRegistered(_) => "not_registered",
        }
    }
}

/// Errors raised by the parameter resolver registry.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no parameter resolver found for {0}")]
    NoResolver(&'static str),

    #[error("no ambient application context attached to the request")]
    NoContext,

    #[error("resolved value for {expected} had an unexpected type")]
    TypeMismatch { expected: &'static str },

    #[error("binding failed: {0}")]
    Bind(#[from] BindError),
}

impl ResolveError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoResolver(_) => "no_resolver",
            Self::NoContext => "no_context",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Bind(_) => "bind_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_codes() {
        assert_eq!(HttpError::not_found().error_code(), "not_found");
        assert_eq!(HttpError::bad_request().error_code(), "bad_request");
        assert_eq!(HttpError::internal("oops").error_code(), "internal_error");
    }

    #[test]
    fn test_http_error_statuses() {
        assert_eq!(HttpError::not_found().status, StatusCode::NOT_FOUND);
        assert_eq!(HttpError::no_content().status, StatusCode::NO_CONTENT);
        assert_eq!(HttpError::internal("x").status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_handler_error_status() {
        let err = HandlerError::from(HttpError::bad_request());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "bad_request");

        let err = HandlerError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "internal_error");
    }

    #[test]
    fn test_resolve_error_codes() {
        assert_eq!(ResolveError::NoResolver("Foo").error_code(), "no_resolver");
        assert_eq!(ResolveError::NoContext.error_code(), "no_context");
    }

    #[test]
    fn test_with_message() {
        let err = HttpError::not_found().with_message("user 42 does not exist");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "user 42 does not exist");
    }
}
