//! AWS Signature Version 4 request signing.
//!
//! Implements the `AWS4-HMAC-SHA256` scheme used to authenticate calls to
//! the rendezvous store:
//!
//! 1. Hash the payload (`sha256`, lower-case hex).
//! 2. Build the canonical request from method, URI, query, headers and
//!    payload hash.
//! 3. Build the string to sign from the timestamp, credential scope and the
//!    canonical request hash.
//! 4. Derive the signing key by HMAC chaining date → region → service →
//!    `aws4_request`.
//! 5. Sign and assemble the `Authorization` header.
//!
//! The building blocks are public so they can be checked against the
//! published SigV4 test suite.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// Algorithm identifier placed in the string to sign and the header.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Final component of every credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// `X-Amz-Date` format (`yyyyMMddTHHmmssZ`).
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Date stamp format used in the credential scope.
pub const DATE_STAMP_FORMAT: &str = "%Y%m%d";

type HmacSha256 = Hmac<Sha256>;

/// Signing errors.
#[derive(Debug, Error)]
pub enum SignError {
    /// Method or URI unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The credential provider had nothing to offer.
    #[error("credentials unavailable: {0}")]
    MissingCredentials(String),
}

/// An access key pair.
///
/// The secret is zeroed when dropped and never printed.
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: Zeroizing<String>,
}

impl Credentials {
    /// Create credentials from an access key id and secret.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: Zeroizing::new(secret_access_key.into()),
        }
    }

    /// The public access key id.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Source of signing credentials.
pub trait CredentialProvider: Send + Sync {
    /// Fetch the credentials to sign the next request with.
    fn credentials(&self) -> Result<Credentials, SignError>;
}

/// A provider that always returns the same credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    /// Wrap fixed credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, SignError> {
        Ok(self.0.clone())
    }
}

/// Reads `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    /// Environment variable holding the access key id.
    pub const ACCESS_KEY_VAR: &'static str = "AWS_ACCESS_KEY_ID";
    /// Environment variable holding the secret access key.
    pub const SECRET_KEY_VAR: &'static str = "AWS_SECRET_ACCESS_KEY";
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials, SignError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SignError::MissingCredentials(format!("{name} is not set")))
        };
        Ok(Credentials::new(
            read(Self::ACCESS_KEY_VAR)?,
            read(Self::SECRET_KEY_VAR)?,
        ))
    }
}

/// Fixed parameters of every signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    /// Value of the signed `host` header (no scheme, no path).
    pub host: String,
    /// Region component of the credential scope.
    pub region: String,
    /// Service component of the credential scope.
    pub service: String,
    /// Value of the signed `content-type` header.
    pub content_type: String,
}

impl SigningConfig {
    /// Config for an API Gateway host (`execute-api`, JSON bodies).
    pub fn execute_api(host: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            region: region.into(),
            service: "execute-api".to_string(),
            content_type: "application/json".to_string(),
        }
    }
}

/// A fully signed request, ready to be sent.
///
/// Bound to the timestamp it was signed at; sign again for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: String,
    /// Canonical (already encoded) URI path.
    pub canonical_uri: String,
    /// Canonical query string, empty when there is none.
    pub canonical_query_string: String,
    /// Signed headers, lower-cased and sorted.
    pub headers: Vec<(String, String)>,
    /// `;`-joined signed header names.
    pub signed_headers: String,
    /// Hex sha256 of the body.
    pub payload_hash: String,
    /// Hex HMAC signature.
    pub signature: String,
    /// Complete `Authorization` header value.
    pub authorization: String,
    /// Signing time.
    pub timestamp: DateTime<Utc>,
}

impl SignedRequest {
    /// The `X-Amz-Date` header value.
    pub fn amz_date(&self) -> String {
        self.timestamp.format(AMZ_DATE_FORMAT).to_string()
    }

    /// Look up a signed header by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Signs rendezvous requests with injected credentials.
pub struct RequestSigner {
    config: SigningConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl RequestSigner {
    /// Create a signer.
    pub fn new(config: SigningConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// Fixed signing parameters.
    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Sign a request at the current time.
    pub fn sign(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query_string: &str,
        body: &[u8],
    ) -> Result<SignedRequest, SignError> {
        self.sign_at(method, canonical_uri, canonical_query_string, body, Utc::now())
    }

    /// Sign a request at a fixed time.
    ///
    /// Deterministic for fixed credentials and `now`.
    pub fn sign_at(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query_string: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, SignError> {
        if method.trim().is_empty() {
            return Err(SignError::InvalidInput("method is empty".into()));
        }
        if canonical_uri.is_empty() {
            return Err(SignError::InvalidInput("canonical URI is empty".into()));
        }
        if !canonical_uri.starts_with('/') {
            return Err(SignError::InvalidInput(format!(
                "canonical URI must start with '/': {canonical_uri}"
            )));
        }

        let credentials = self.credentials.credentials()?;
        let method = method.to_ascii_uppercase();
        let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
        let date_stamp = now.format(DATE_STAMP_FORMAT).to_string();
        let payload_hash = sha256_hex(body);

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), self.config.content_type.clone());
        headers.insert("host".to_string(), self.config.host.clone());
        headers.insert("x-amz-date".to_string(), amz_date.clone());

        let (canonical_headers, signed_headers) = canonical_headers(&headers);
        let canonical = canonical_request(
            &method,
            canonical_uri,
            canonical_query_string,
            &canonical_headers,
            &signed_headers,
            &payload_hash,
        );
        let scope = credential_scope(&date_stamp, &self.config.region, &self.config.service);
        let to_sign = string_to_sign(&amz_date, &scope, &canonical);
        let key = derive_signing_key(
            credentials.secret_access_key(),
            &date_stamp,
            &self.config.region,
            &self.config.service,
        );
        let signature = hex::encode(hmac_sha256(key.as_slice(), to_sign.as_bytes()));
        let authorization = authorization_header(
            credentials.access_key_id(),
            &scope,
            &signed_headers,
            &signature,
        );

        Ok(SignedRequest {
            method,
            canonical_uri: canonical_uri.to_string(),
            canonical_query_string: canonical_query_string.to_string(),
            headers: headers.into_iter().collect(),
            signed_headers,
            payload_hash,
            signature,
            authorization,
            timestamp: now,
        })
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Lower-case hex sha256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// HMAC-SHA256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Canonical header block and signed header list.
///
/// Keys must already be lower-case; the map keeps them sorted. Every
/// header line ends with `\n`, including the last.
pub fn canonical_headers(headers: &BTreeMap<String, String>) -> (String, String) {
    let block: String = headers
        .iter()
        .map(|(key, value)| format!("{}:{}\n", key, value.trim()))
        .collect();
    let signed = headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");
    (block, signed)
}

/// Assemble the canonical request.
pub fn canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query_string: &str,
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{canonical_uri}\n{canonical_query_string}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    )
}

/// `date/region/service/aws4_request`.
pub fn credential_scope(date_stamp: &str, region: &str, service: &str) -> String {
    format!("{date_stamp}/{region}/{service}/{SCOPE_TERMINATOR}")
}

/// Assemble the string to sign for a canonical request.
pub fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Derive the per-day signing key.
pub fn derive_signing_key(
    secret_access_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Zeroizing<Vec<u8>> {
    let seed = Zeroizing::new(format!("AWS4{secret_access_key}"));
    let k_date = Zeroizing::new(hmac_sha256(seed.as_bytes(), date_stamp.as_bytes()));
    let k_region = Zeroizing::new(hmac_sha256(&k_date, region.as_bytes()));
    let k_service = Zeroizing::new(hmac_sha256(&k_region, service.as_bytes()));
    Zeroizing::new(hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes()))
}

/// Assemble the `Authorization` header value.
pub fn authorization_header(
    access_key_id: &str,
    scope: &str,
    signed_headers: &str,
    signature: &str,
) -> String {
    format!(
        "{ALGORITHM} Credential={access_key_id}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
    )
}

/// Build a canonical query string from name/value pairs.
///
/// Names and values are URI-encoded and the pairs sorted by encoded name,
/// then value.
pub fn canonical_query_string(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(name, value)| (uri_encode(name), uri_encode(value)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
