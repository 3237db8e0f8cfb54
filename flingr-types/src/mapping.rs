//! NAT gateway port mappings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::Endpoint;

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// TCP mapping.
    Tcp,
    /// UDP mapping.
    Udp,
}

impl Protocol {
    /// Every protocol mapped per connection, in mapping order.
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    /// Name as the mapping tool expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingState {
    /// No mapping exists (initial and post-removal state).
    Unmapped,
    /// The gateway confirmed the mapping.
    Mapped,
    /// The gateway did not confirm the mapping.
    Failed,
}

/// One gateway rule for one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Transport protocol.
    pub protocol: Protocol,
    /// Endpoint the rule forwards to.
    pub endpoint: Endpoint,
    /// Current state.
    pub state: MappingState,
}

impl PortMapping {
    /// Create an unmapped rule for the given protocol.
    pub fn new(protocol: Protocol, endpoint: Endpoint) -> Self {
        Self {
            protocol,
            endpoint,
            state: MappingState::Unmapped,
        }
    }

    /// Check whether the gateway confirmed this rule.
    pub fn is_mapped(&self) -> bool {
        self.state == MappingState::Mapped
    }
}

/// How much of a mapping attempt succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingOutcome {
    /// Every protocol is mapped.
    Full,
    /// Some, but not all, protocols are mapped.
    Partial,
    /// Nothing is mapped.
    None,
}

impl MappingOutcome {
    /// Check whether at least one protocol is mapped.
    pub fn is_usable(&self) -> bool {
        !matches!(self, MappingOutcome::None)
    }
}

/// Result of one `add_mapping` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingResult {
    /// One entry per attempted protocol.
    pub mappings: Vec<PortMapping>,
    /// External address discovered from the gateway.
    pub external_ip: Option<Ipv4Addr>,
    /// External port that was requested.
    pub external_port: u16,
}

impl MappingResult {
    /// True when every protocol was confirmed.
    pub fn success(&self) -> bool {
        self.outcome() == MappingOutcome::Full
    }

    /// Classify the attempt.
    pub fn outcome(&self) -> MappingOutcome {
        let mapped = self.mappings.iter().filter(|m| m.is_mapped()).count();
        if mapped == 0 {
            MappingOutcome::None
        } else if mapped == self.mappings.len() {
            MappingOutcome::Full
        } else {
            MappingOutcome::Partial
        }
    }

    /// Protocols the gateway confirmed.
    pub fn mapped_protocols(&self) -> Vec<Protocol> {
        self.mappings
            .iter()
            .filter(|m| m.is_mapped())
            .map(|m| m.protocol)
            .collect()
    }
}
