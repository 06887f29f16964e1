//! Media types for request and response bodies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Negotiated content type of a request or response body.
///
/// Content negotiation itself lives outside the core: handlers pick the
/// outbound type explicitly via `set_response_content_type`, and the inbound
/// type is read from the `Content-Type` header. JSON is the default when
/// nothing was negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    #[default]
    Json,
    Xml,
    TextHtml,
    Other,
}

impl MediaType {
    /// Wire name used for the `Content-Type` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::TextHtml => "text/html",
            Self::Other => "application/octet-stream",
        }
    }

    /// Classify a MIME string from a `Content-Type` header.
    ///
    /// Parameters (`; charset=...`) are ignored. Anything unrecognized maps
    /// to `Other`.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        if essence.contains("json") {
            Self::Json
        } else if essence.contains("xml") {
            Self::Xml
        } else if essence.contains("html") {
            Self::TextHtml
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
