//! Mock HTTP transport for testing.
//!
//! Allows queueing responses and capturing sent requests for verification.

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Responses are handed out in queue order. An empty queue answers with a
/// connection failure, so an unexpected call shows up as a failed request.
#[derive(Debug, Default)]
pub struct MockHttpTransport {
    inner: Arc<Mutex<MockHttpInner>>,
}

#[derive(Debug, Default)]
struct MockHttpInner {
    sent_requests: Vec<HttpRequest>,
    responses: VecDeque<Reply>,
}

#[derive(Debug)]
enum Reply {
    Ready(Result<HttpResponse, TransportError>),
    Stall,
}

impl MockHttpTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next `send()` call.
    pub fn queue_response(&self, status: u16, body: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.responses.push_back(Reply::Ready(Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        })));
    }

    /// Cause the next `send()` to fail with the given error.
    pub fn queue_failure(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.responses.push_back(Reply::Ready(Err(error)));
    }

    /// Cause the next `send()` to never complete.
    pub fn queue_stall(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.responses.push_back(Reply::Stall);
    }

    /// Get all requests that were sent.
    pub fn sent_requests(&self) -> Vec<HttpRequest> {
        let inner = self.inner.lock().unwrap();
        inner.sent_requests.clone()
    }

    /// Get the last request that was sent.
    pub fn last_sent(&self) -> Option<HttpRequest> {
        let inner = self.inner.lock().unwrap();
        inner.sent_requests.last().cloned()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.sent_requests.len()
    }
}

impl Clone for MockHttpTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let next = {
            let mut inner = self.inner.lock().unwrap();
            inner.sent_requests.push(request);
            inner.responses.pop_front()
        };
        match next {
            Some(Reply::Ready(response)) => response,
            Some(Reply::Stall) => std::future::pending().await,
            None => Err(TransportError::ConnectionFailed("no response queued".into())),
        }
    }
}
