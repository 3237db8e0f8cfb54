//! The endpoint being exposed through the gateway.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::FlingrError;

/// A local service address and the external address it is reachable on.
///
/// `local_port` and `external_port` are always non-zero. The external
/// address is unknown until a port mapping discovers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    local_address: Ipv4Addr,
    local_port: u16,
    external_address: Option<Ipv4Addr>,
    external_port: u16,
}

impl Endpoint {
    /// Create an endpoint with an explicit external port candidate.
    ///
    /// # Errors
    ///
    /// Returns [`FlingrError::Validation`] if either port is zero.
    pub fn new(
        local_address: Ipv4Addr,
        local_port: u16,
        external_port: u16,
    ) -> Result<Self, FlingrError> {
        if local_port == 0 {
            return Err(FlingrError::Validation("local port must be in 1..=65535".into()));
        }
        if external_port == 0 {
            return Err(FlingrError::Validation(
                "external port must be in 1..=65535".into(),
            ));
        }
        Ok(Self {
            local_address,
            local_port,
            external_address: None,
            external_port,
        })
    }

    /// Create an endpoint with a random external port candidate.
    pub fn with_random_external_port(
        local_address: Ipv4Addr,
        local_port: u16,
    ) -> Result<Self, FlingrError> {
        Self::new(local_address, local_port, random_external_port())
    }

    /// Build an endpoint from unvalidated user input.
    ///
    /// Ports are accepted as wide integers so out-of-range values are
    /// reported instead of silently truncated.
    pub fn from_user_input(
        local_address: &str,
        local_port: u32,
        external_port: u32,
    ) -> Result<Self, FlingrError> {
        let local_address = local_address.trim().parse::<Ipv4Addr>().map_err(|_| {
            FlingrError::Validation(format!("invalid IPv4 address: {local_address:?}"))
        })?;
        Self::new(
            local_address,
            checked_port(local_port, "local")?,
            checked_port(external_port, "external")?,
        )
    }

    /// LAN address the service listens on.
    pub fn local_address(&self) -> Ipv4Addr {
        self.local_address
    }

    /// LAN port the service listens on.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Public address discovered from the gateway, if any.
    pub fn external_address(&self) -> Option<Ipv4Addr> {
        self.external_address
    }

    /// Public port requested from the gateway.
    pub fn external_port(&self) -> u16 {
        self.external_port
    }

    /// Record the public address reported by the gateway.
    pub fn set_external_address(&mut self, address: Ipv4Addr) {
        self.external_address = Some(address);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.external_address {
            Some(ip) => write!(
                f,
                "{}:{} -> {}:{}",
                ip, self.external_port, self.local_address, self.local_port
            ),
            None => write!(
                f,
                "?:{} -> {}:{}",
                self.external_port, self.local_address, self.local_port
            ),
        }
    }
}

/// Draw an external port candidate uniformly from `1..=65535`.
pub fn random_external_port() -> u16 {
    rand::thread_rng().gen_range(1..=u16::MAX)
}

fn checked_port(value: u32, which: &str) -> Result<u16, FlingrError> {
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(FlingrError::Validation(format!(
            "{which} port must be in 1..=65535, got {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_zero_ports() {
        let ip = Ipv4Addr::new(192, 168, 1, 10);
        assert!(Endpoint::new(ip, 0, 51413).is_err());
        assert!(Endpoint::new(ip, 22, 0).is_err());
        assert!(Endpoint::new(ip, 22, 51413).is_ok());
    }

    #[test]
    fn external_address_starts_unknown() {
        let mut endpoint = Endpoint::new(Ipv4Addr::new(192, 168, 1, 10), 22, 51413).unwrap();
        assert_eq!(endpoint.external_address(), None);

        endpoint.set_external_address(Ipv4Addr::new(203, 0, 113, 5));
        assert_eq!(
            endpoint.external_address(),
            Some(Ipv4Addr::new(203, 0, 113, 5))
        );
    }

    #[test]
    fn random_port_is_never_zero() {
        for _ in 0..1000 {
            assert_ne!(random_external_port(), 0);
        }
    }

    #[test]
    fn user_input_is_validated() {
        assert!(Endpoint::from_user_input("192.168.1.10", 22, 51413).is_ok());
        assert!(matches!(
            Endpoint::from_user_input("192.168.1", 22, 51413),
            Err(FlingrError::Validation(_))
        ));
        assert!(matches!(
            Endpoint::from_user_input("192.168.1.256", 22, 51413),
            Err(FlingrError::Validation(_))
        ));
        assert!(matches!(
            Endpoint::from_user_input("192.168.1.10", 70000, 51413),
            Err(FlingrError::Validation(_))
        ));
        assert!(matches!(
            Endpoint::from_user_input("192.168.1.10", 22, 0),
            Err(FlingrError::Validation(_))
        ));
    }

    #[test]
    fn display_shows_both_sides() {
        let mut endpoint = Endpoint::new(Ipv4Addr::new(192, 168, 1, 10), 22, 51413).unwrap();
        assert_eq!(endpoint.to_string(), "?:51413 -> 192.168.1.10:22");
        endpoint.set_external_address(Ipv4Addr::new(203, 0, 113, 5));
        assert_eq!(endpoint.to_string(), "203.0.113.5:51413 -> 192.168.1.10:22");
    }
}
