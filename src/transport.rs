//! Transport seam.
//!
//! The core never touches sockets. It renders the finalized response into a
//! [`WireResponse`] and hands it to whatever [`Transport`] the caller attached
//! to the context: a real connection writer in production, a recording sink in
//! tests.

use crate::media::MediaType;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use std::sync::Arc;

/// The rendered, final form of a response: status line, `Content-Type`,
/// extra headers, serialized body.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: StatusCode,
    pub content_type: MediaType,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Sink for the finalized response. Implemented by the transport layer.
pub trait Transport: Send {
    fn write(&mut self, response: WireResponse);
}

/// Transport that records every write into a shared buffer.
///
/// Cloning shares the buffer, so a test can keep one handle and give the
/// other to the context.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    written: Arc<Mutex<Vec<WireResponse>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of responses written so far.
    pub fn count(&self) -> usize {
        self.written.lock().len()
    }

    /// The most recent response, if any.
    pub fn last(&self) -> Option<WireResponse> {
        self.written.lock().last().cloned()
    }
}

impl Transport for RecordingTransport {
    fn write(&mut self, response: WireResponse) {
        self.written.lock().push(response);
    }
}
