//! HTTP transport abstraction for the rendezvous store.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying HTTP client (reqwest, mock for testing).
//!
//! # Design
//!
//! The transport only moves bytes. Signing happens before a request reaches
//! it, and the response body is handed back whatever the status code, since
//! the store reports rejections in the body.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockHttpTransport::new();
//! transport.queue_response(200, r#"{"Item":{"id":{"S":"abc123"}}}"#);
//! let response = transport.send(request).await?;
//! ```

mod http;
mod mock;

pub use http::{ReqwestTransport, DEFAULT_TIMEOUT};
pub use mock::MockHttpTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the host.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built or sent.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The response body could not be read.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// A request ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL including any query string.
    pub url: String,
    /// Headers in send order.
    pub headers: Vec<(String, String)>,
    /// Request body, empty for bodiless requests.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport trait for talking to the rendezvous store.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request and return the response, whatever its status.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
