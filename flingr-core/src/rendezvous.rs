//! Rendezvous store payloads.
//!
//! The store speaks the DynamoDB attribute-value shape: every field is
//! wrapped as `{"S": "<string>"}`.
//!
//! - register: `{"Item": {ipAddr, wanPort, lanAddr, lanPort}, "TableName": ...}`
//! - unregister: `{"Key": {"id": ...}, "TableName": ...}`
//! - response: `{"Item": {"id": {"S": "<id>"}, ...}}`

use flingr_types::{Endpoint, LookupRecord, RegistrationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload and response errors.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The endpoint has no external address yet.
    #[error("endpoint has no external address")]
    MissingExternalAddress,

    /// The response was not the expected JSON.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The response parsed but lacks `Item`.
    #[error("response has no Item")]
    MissingItem,

    /// `Item` lacks a usable id.
    #[error("response Item has no id")]
    MissingId,

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A string attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// String value.
    #[serde(rename = "S")]
    pub s: String,
}

impl AttributeValue {
    fn new(value: impl ToString) -> Self {
        Self {
            s: value.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterItem {
    #[serde(rename = "ipAddr")]
    ip_addr: AttributeValue,
    #[serde(rename = "wanPort")]
    wan_port: AttributeValue,
    #[serde(rename = "lanAddr")]
    lan_addr: AttributeValue,
    #[serde(rename = "lanPort")]
    lan_port: AttributeValue,
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    #[serde(rename = "Item")]
    item: RegisterItem,
    #[serde(rename = "TableName")]
    table_name: &'a str,
}

#[derive(Debug, Serialize)]
struct RecordKey {
    id: AttributeValue,
}

#[derive(Debug, Serialize)]
struct UnregisterBody<'a> {
    #[serde(rename = "Key")]
    key: RecordKey,
    #[serde(rename = "TableName")]
    table_name: &'a str,
}

/// `Item` as returned by the store. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ResponseItem {
    id: Option<AttributeValue>,
    #[serde(rename = "ipAddr")]
    ip_addr: Option<AttributeValue>,
    #[serde(rename = "wanPort")]
    wan_port: Option<AttributeValue>,
    #[serde(rename = "lanAddr")]
    lan_addr: Option<AttributeValue>,
    #[serde(rename = "lanPort")]
    lan_port: Option<AttributeValue>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "Item")]
    item: Option<ResponseItem>,
}

/// Body of a register call.
///
/// # Errors
///
/// Returns [`PayloadError::MissingExternalAddress`] if the endpoint has not
/// been mapped yet.
pub fn register_body(endpoint: &Endpoint, table_name: &str) -> Result<Vec<u8>, PayloadError> {
    let external = endpoint
        .external_address()
        .ok_or(PayloadError::MissingExternalAddress)?;
    let body = RegisterBody {
        item: RegisterItem {
            ip_addr: AttributeValue::new(external),
            wan_port: AttributeValue::new(endpoint.external_port()),
            lan_addr: AttributeValue::new(endpoint.local_address()),
            lan_port: AttributeValue::new(endpoint.local_port()),
        },
        table_name,
    };
    serde_json::to_vec(&body).map_err(|e| PayloadError::Serialization(e.to_string()))
}

/// Body of an unregister call.
pub fn unregister_body(id: &RegistrationId, table_name: &str) -> Result<Vec<u8>, PayloadError> {
    let body = UnregisterBody {
        key: RecordKey {
            id: AttributeValue::new(id.as_str()),
        },
        table_name,
    };
    serde_json::to_vec(&body).map_err(|e| PayloadError::Serialization(e.to_string()))
}

fn parse_item(body: &[u8]) -> Result<ResponseItem, PayloadError> {
    let response: ResponseBody =
        serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    response.item.ok_or(PayloadError::MissingItem)
}

fn item_id(item: &ResponseItem) -> Result<RegistrationId, PayloadError> {
    item.id
        .as_ref()
        .and_then(|id| RegistrationId::new(id.s.clone()))
        .ok_or(PayloadError::MissingId)
}

/// Extract the assigned id from a register response (`Item.id.S`).
pub fn parse_register_response(body: &[u8]) -> Result<RegistrationId, PayloadError> {
    item_id(&parse_item(body)?)
}

/// Extract a full record from a lookup response.
///
/// Only the id is mandatory; address fields that are missing or do not
/// parse are left empty.
pub fn parse_lookup_response(body: &[u8]) -> Result<LookupRecord, PayloadError> {
    let item = parse_item(body)?;
    let id = item_id(&item)?;

    Ok(LookupRecord {
        id,
        external_address: parse_field(&item.ip_addr),
        external_port: parse_field(&item.wan_port),
        local_address: parse_field(&item.lan_addr),
        local_port: parse_field(&item.lan_port),
    })
}

fn parse_field<T: std::str::FromStr>(value: &Option<AttributeValue>) -> Option<T> {
    value.as_ref().and_then(|v| v.s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn mapped_endpoint() -> Endpoint {
        let mut endpoint = Endpoint::new(Ipv4Addr::new(192, 168, 1, 10), 22, 51413).unwrap();
        endpoint.set_external_address(Ipv4Addr::new(203, 0, 113, 5));
        endpoint
    }

    #[test]
    fn register_body_shape() {
        let body = register_body(&mapped_endpoint(), "flingrMap").unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"Item":{"ipAddr":{"S":"203.0.113.5"},"wanPort":{"S":"51413"},"lanAddr":{"S":"192.168.1.10"},"lanPort":{"S":"22"}},"TableName":"flingrMap"}"#
        );
    }

    #[test]
    fn register_body_needs_external_address() {
        let endpoint = Endpoint::new(Ipv4Addr::new(192, 168, 1, 10), 22, 51413).unwrap();
        assert!(matches!(
            register_body(&endpoint, "flingrMap"),
            Err(PayloadError::MissingExternalAddress)
        ));
    }

    #[test]
    fn unregister_body_shape() {
        let id = RegistrationId::new("abc123").unwrap();
        assert_eq!(
            String::from_utf8(unregister_body(&id, "flingrMap").unwrap()).unwrap(),
            r#"{"Key":{"id":{"S":"abc123"}},"TableName":"flingrMap"}"#
        );
    }

    #[test]
    fn parses_assigned_id() {
        let id = parse_register_response(br#"{"Item":{"id":{"S":"abc123"}}}"#).unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn response_without_item_fails() {
        let body = br#"{"ResponseMetadata":{"RetryAttempts":0,"HTTPStatusCode":200,"RequestId":"X"}}"#;
        assert!(matches!(
            parse_register_response(body),
            Err(PayloadError::MissingItem)
        ));
    }

    #[test]
    fn item_without_id_fails() {
        assert!(matches!(
            parse_register_response(br#"{"Item":{"ipAddr":{"S":"203.0.113.5"}}}"#),
            Err(PayloadError::MissingId)
        ));
        assert!(matches!(
            parse_register_response(br#"{"Item":{"id":{"S":""}}}"#),
            Err(PayloadError::MissingId)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_register_response(b"<html>Bad Gateway</html>"),
            Err(PayloadError::Malformed(_))
        ));
        assert!(matches!(
            parse_register_response(br#"{"Item":"nope"}"#),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn parses_lookup_record() {
        let body = br#"{"Item":{"id":{"S":"abc123"},"ipAddr":{"S":"203.0.113.5"},"wanPort":{"S":"51413"},"lanAddr":{"S":"192.168.1.10"},"lanPort":{"S":"22"},"timestamp":{"S":"1500000000"}}}"#;
        let record = parse_lookup_response(body).unwrap();
        assert_eq!(record.id.as_str(), "abc123");
        assert_eq!(record.external_address, Some(Ipv4Addr::new(203, 0, 113, 5)));
        assert_eq!(record.external_port, Some(51413));
        assert_eq!(record.local_address, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(record.local_port, Some(22));
    }

    #[test]
    fn lookup_tolerates_bad_fields() {
        let body = br#"{"Item":{"id":{"S":"abc123"},"wanPort":{"S":"99999"}}}"#;
        let record = parse_lookup_response(body).unwrap();
        assert_eq!(record.external_port, None);
        assert_eq!(record.external_address, None);
    }
}
