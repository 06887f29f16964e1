//! Response entity: status, negotiated content type, erased body payload.
//!
//! The body is stored as a type-erased `Serialize` value and only rendered to
//! bytes when the response is finalized, so a handler can set a typed value
//! and a later interceptor can still change the negotiated content type.

use crate::media::MediaType;
use crate::transport::WireResponse;
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;

/// A body payload that can be rendered in any negotiated content type.
trait ErasedBody: Send {
    fn to_json(&self) -> anyhow::Result<Vec<u8>>;
    fn to_xml(&self) -> anyhow::Result<Vec<u8>>;
    fn to_plain(&self) -> anyhow::Result<Vec<u8>>;
}

impl<T: Serialize + Send> ErasedBody for T {
    fn to_json(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(anyhow::Error::new)
    }

    fn to_xml(&self) -> anyhow::Result<Vec<u8>> {
        quick_xml::se::to_string(self)
            .map(String::into_bytes)
            .map_err(anyhow::Error::new)
    }

    fn to_plain(&self) -> anyhow::Result<Vec<u8>> {
        // Strings render raw; anything else falls back to its JSON text.
        let value = serde_json::to_value(self)?;
        Ok(match value {
            serde_json::Value::String(s) => s.into_bytes(),
            other => other.to_string().into_bytes(),
        })
    }
}

/// The accumulated response for one request.
pub struct ResponseEntity {
    status: StatusCode,
    content_type: MediaType,
    body: Option<Box<dyn ErasedBody>>,
    headers: Vec<(String, String)>,
}

impl Default for ResponseEntity {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            content_type: MediaType::default(),
            body: None,
            headers: Vec::new(),
        }
    }
}

impl ResponseEntity {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> MediaType {
        self.content_type
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn set_content_type(&mut self, media: MediaType) -> &mut Self {
        self.content_type = media;
        self
    }

    /// Store a typed body payload; serialization is deferred to finalization.
    pub fn set_body<B: Serialize + Send + 'static>(&mut self, body: B) -> &mut Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn clear_body(&mut self) -> &mut Self {
        self.body = None;
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Render the entity for the transport. The body is serialized according
    /// to the negotiated content type; an unset body renders as empty bytes
    /// regardless of status.
    pub fn to_wire(&self) -> anyhow::Result<WireResponse> {
        let body = match &self.body {
            None => Bytes::new(),
            Some(body) => Bytes::from(match self.content_type {
                MediaType::Json => body.to_json()?,
                MediaType::Xml => body.to_xml()?,
                MediaType::TextHtml | MediaType::Other => body.to_plain()?,
            }),
        };
        Ok(WireResponse {
            status: self.status,
            content_type: self.content_type,
            headers: self.headers.clone(),
            body,
        })
    }
}
