//! Rendezvous store client.
//!
//! Publishes the current endpoint under a store-assigned id so a remote peer
//! can find this machine later. Every call is signed with SigV4 and sent as
//! JSON to `https://<host><stage><path>`.
//!
//! Registration is "latest wins": each `register` creates a fresh record
//! and id. Refreshing means registering again. Stale records are expected
//! to expire server-side, so `unregister` is advisory.

use flingr_core::rendezvous::{self, PayloadError};
use flingr_core::sigv4::canonical_query_string;
use flingr_core::{RequestSigner, SignError, SignedRequest};
use flingr_types::{Endpoint, FlingrError, LookupRecord, RegistrationId};
use std::sync::Arc;
use thiserror::Error;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Rendezvous errors.
#[derive(Debug, Error)]
pub enum RendezvousError {
    /// The request could not be signed.
    #[error("signing failed: {0}")]
    Sign(#[from] SignError),

    /// The payload could not be built or the response lacked fields.
    #[error("{0}")]
    Payload(#[from] PayloadError),

    /// The request did not complete.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The store answered with an error status.
    #[error("store answered HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
}

impl From<&RendezvousError> for FlingrError {
    fn from(e: &RendezvousError) -> Self {
        match e {
            RendezvousError::Sign(e) => FlingrError::Validation(e.to_string()),
            RendezvousError::Payload(PayloadError::MissingExternalAddress) => {
                FlingrError::Validation(e.to_string())
            }
            RendezvousError::Payload(_) | RendezvousError::Status { .. } => {
                FlingrError::RemoteRejection(e.to_string())
            }
            RendezvousError::Transport(
                TransportError::ConnectionFailed(_) | TransportError::Timeout,
            ) => FlingrError::NetworkUnavailable,
            RendezvousError::Transport(_) => FlingrError::ToolInvocation {
                tool: "rendezvous".into(),
                reason: e.to_string(),
            },
        }
    }
}

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousConfig {
    /// API host, no scheme or path.
    pub host: String,
    /// Deployment stage prefix, e.g. `/test`; may be empty.
    pub stage: String,
    /// Resource path.
    pub path: String,
    /// Table name placed in every body.
    pub table: String,
}

impl RendezvousConfig {
    /// Canonical URI (`<stage><path>`).
    pub fn canonical_uri(&self) -> String {
        format!("{}{}", self.stage, self.path)
    }

    fn url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("https://{}{}", self.host, self.canonical_uri())
        } else {
            format!("https://{}{}?{}", self.host, self.canonical_uri(), query)
        }
    }
}

/// Client for the rendezvous store.
pub struct RendezvousClient {
    config: RendezvousConfig,
    signer: RequestSigner,
    transport: Arc<dyn HttpTransport>,
}

impl RendezvousClient {
    /// Create a client.
    pub fn new(
        config: RendezvousConfig,
        signer: RequestSigner,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            signer,
            transport,
        }
    }

    /// Store location.
    pub fn config(&self) -> &RendezvousConfig {
        &self.config
    }

    /// Publish `endpoint` and return the id the store assigned.
    ///
    /// Any transport error, unparseable body or missing `Item.id.S` is an
    /// error value; the caller decides whether to retry.
    pub async fn register(&self, endpoint: &Endpoint) -> Result<RegistrationId, RendezvousError> {
        let body = rendezvous::register_body(endpoint, &self.config.table)?;
        let response = self.send("PUT", "", body).await?;
        let id = rendezvous::parse_register_response(&response.body)?;
        tracing::info!(id = %id, endpoint = %endpoint, "registered with rendezvous store");
        Ok(id)
    }

    /// Remove the record for `id`. Best effort: failures are logged only.
    pub async fn unregister(&self, id: &RegistrationId) {
        let result = async {
            let body = rendezvous::unregister_body(id, &self.config.table)?;
            let response = self.send("PUT", "", body).await?;
            if !response.is_success() {
                return Err(RendezvousError::Status {
                    status: response.status,
                });
            }
            Ok::<_, RendezvousError>(())
        }
        .await;

        match result {
            Ok(()) => tracing::info!(id = %id, "unregistered from rendezvous store"),
            Err(e) => tracing::warn!(id = %id, error = %e, "unregister failed, record left to expire"),
        }
    }

    /// Read back the record stored under `id`, as a remote peer does.
    pub async fn lookup(&self, id: &RegistrationId) -> Result<LookupRecord, RendezvousError> {
        let query = canonical_query_string(&[("Key", id.as_str())]);
        let response = self.send("GET", &query, Vec::new()).await?;
        if !response.is_success() {
            return Err(RendezvousError::Status {
                status: response.status,
            });
        }
        Ok(rendezvous::parse_lookup_response(&response.body)?)
    }

    async fn send(
        &self,
        method: &str,
        query: &str,
        body: Vec<u8>,
    ) -> Result<HttpResponse, RendezvousError> {
        let signed = self
            .signer
            .sign(method, &self.config.canonical_uri(), query, &body)?;
        let request = build_request(&signed, self.config.url(query), body);
        tracing::debug!(method, url = %request.url, "sending rendezvous request");
        Ok(self.transport.send(request).await?)
    }
}

impl std::fmt::Debug for RendezvousClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousClient")
            .field("config", &self.config)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

fn build_request(signed: &SignedRequest, url: String, body: Vec<u8>) -> HttpRequest {
    let content_type = signed.header("content-type").unwrap_or("application/json");
    HttpRequest {
        method: signed.method.clone(),
        url,
        headers: vec![
            ("Content-Type".to_string(), content_type.to_string()),
            ("X-Amz-Date".to_string(), signed.amz_date()),
            ("Authorization".to_string(), signed.authorization.clone()),
            (
                "x-amz-content-sha256".to_string(),
                signed.payload_hash.clone(),
            ),
        ],
        body,
    }
}
