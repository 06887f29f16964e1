//! Buffered request representation.
//!
//! The transport layer hands the core a fully buffered request: method, path,
//! headers, and body are all in memory before dispatch starts, so every
//! accessor here is synchronous. Path variables are filled in by the external
//! route matcher; the query-argument map is parsed lazily on first access and
//! dropped with the request on reset.

use crate::engine::AppContext;
use crate::error::BindError;
use crate::media::MediaType;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A buffered HTTP-like request.
pub struct Request {
    method: Method,
    path: String,
    raw_query: String,
    headers: HeaderMap,
    body: Bytes,
    path_variables: HashMap<String, String>,
    app_context: Option<Arc<AppContext>>,
    // Lazily parsed query arguments. The cell makes the request !Sync, which
    // is fine: a request is owned by exactly one context for its lifetime.
    query_cache: OnceCell<HashMap<String, String>>,
}

impl Request {
    /// Create a request from a method and a request URI (path plus optional
    /// query string).
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, raw_query) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (uri.to_string(), String::new()),
        };
        Self {
            method,
            path,
            raw_query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            path_variables: HashMap::new(),
            app_context: None,
            query_cache: OnceCell::new(),
        }
    }

    /// Add a header. Invalid names or values are dropped with a debug log
    /// rather than failing request construction.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(n), Ok(v)) => {
                self.headers.insert(n, v);
            }
            _ => debug!(name, "dropping invalid header"),
        }
        self
    }

    /// Attach the raw body payload.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Record a path variable extracted by the route matcher.
    pub fn with_path_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_variables.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path variable by name, as extracted by the route matcher.
    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(String::as_str)
    }

    /// Query parameter by name. Parses the query string on first access.
    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query_arguments().get(name).map(String::as_str)
    }

    /// The parsed query-argument map.
    pub fn query_arguments(&self) -> &HashMap<String, String> {
        self.query_cache.get_or_init(|| parse_query(&self.raw_query))
    }

    /// Content type declared by the `Content-Type` header; JSON if absent.
    pub fn content_type(&self) -> MediaType {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(MediaType::from_mime)
            .unwrap_or_default()
    }

    /// Deserialize the buffered body according to the declared content type.
    ///
    /// JSON and XML are supported; anything else is read as JSON, the
    /// negotiation default. A deserialization failure here is fatal to the
    /// bind and escalates as an internal error.
    pub fn deserialize_body<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        match self.content_type() {
            MediaType::Xml => {
                let text = std::str::from_utf8(&self.body).map_err(|e| BindError::Body {
                    media: MediaType::Xml,
                    source: anyhow::Error::new(e),
                })?;
                quick_xml::de::from_str(text).map_err(|e| BindError::Body {
                    media: MediaType::Xml,
                    source: anyhow::Error::new(e),
                })
            }
            media => serde_json::from_slice(&self.body).map_err(|e| BindError::Body {
                media,
                source: anyhow::Error::new(e),
            }),
        }
    }

    /// Ambient application context, if the engine attached one.
    pub fn app_context(&self) -> Option<&Arc<AppContext>> {
        self.app_context.as_ref()
    }

    pub(crate) fn set_app_context(&mut self, app: Arc<AppContext>) {
        self.app_context = Some(app);
    }
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        args.insert(decode_component(key), decode_component(value));
    }
    args
}

/// Percent-decode a query component, treating `+` as space.
fn decode_component(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
