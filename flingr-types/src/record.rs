//! Rendezvous records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::Endpoint;

/// Opaque identifier the rendezvous store assigns to a registration.
///
/// Never empty.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Wrap a store-assigned id. Returns `None` for blank input.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistrationId({})", self.0)
    }
}

/// The record currently displayed for this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Id from the last successful registration; `None` if none succeeded.
    pub id: Option<RegistrationId>,
    /// Endpoint that was registered.
    pub endpoint: Endpoint,
    /// When the id was last refreshed.
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl RegistrationRecord {
    /// A record for an endpoint that has not been registered yet.
    pub fn unregistered(endpoint: Endpoint) -> Self {
        Self {
            id: None,
            endpoint,
            last_refreshed_at: None,
        }
    }

    /// Replace the id after a successful (re-)registration.
    pub fn refresh(&mut self, id: RegistrationId, at: DateTime<Utc>) {
        self.id = Some(id);
        self.last_refreshed_at = Some(at);
    }
}

/// A record as read back by a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    /// The record id that was looked up.
    pub id: RegistrationId,
    /// Public address of the published machine.
    pub external_address: Option<Ipv4Addr>,
    /// Public port of the published machine.
    pub external_port: Option<u16>,
    /// LAN address, useful when the peer shares the LAN.
    pub local_address: Option<Ipv4Addr>,
    /// LAN port.
    pub local_port: Option<u16>,
}
