//! Parsers for the `upnpc` (miniupnpc) command-line client's output.
//!
//! Only the textual contract is relied upon:
//! - `Local LAN ip address : 192.168.1.10`
//! - `ExternalIPAddress = 203.0.113.5`
//! - `external 203.0.113.5:51413 TCP is redirected to internal 192.168.1.10:22 (duration=0)`
//! - `UPNP_DeletePortMapping() returned : 0`

use flingr_types::Protocol;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Arguments for local address discovery.
pub fn discover_args() -> Vec<String> {
    vec!["-P".to_string()]
}

/// Arguments for adding one mapping.
pub fn add_args(
    local_ip: Ipv4Addr,
    local_port: u16,
    external_port: u16,
    protocol: Protocol,
) -> Vec<String> {
    vec![
        "-a".to_string(),
        local_ip.to_string(),
        local_port.to_string(),
        external_port.to_string(),
        protocol.as_str().to_string(),
    ]
}

/// Arguments for deleting one mapping.
pub fn delete_args(external_port: u16, protocol: Protocol) -> Vec<String> {
    vec![
        "-d".to_string(),
        external_port.to_string(),
        protocol.as_str().to_string(),
    ]
}

/// Find the LAN address the gateway sees us on.
pub fn parse_local_ip(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|line| line.contains("Local LAN ip address"))
        .filter_map(|line| line.split_whitespace().last())
        .find_map(|word| word.parse().ok())
}

/// Find the external address reported by the gateway.
///
/// The last report wins when several are printed.
pub fn parse_external_ip(output: &str) -> Option<Ipv4Addr> {
    output
        .lines()
        .filter(|line| line.contains("ExternalIPAddress"))
        .filter_map(|line| {
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                [_, "=", ip] => ip.parse().ok(),
                _ => None,
            }
        })
        .last()
}

/// Find the external `ip:port` of the redirect confirmation for `protocol`.
///
/// A confirmation line names the protocol and contains
/// `is redirected to internal`; the first `ip:port` before that phrase is
/// the external side.
pub fn parse_redirect(output: &str, protocol: Protocol) -> Option<SocketAddrV4> {
    output.lines().find_map(|line| {
        let (external_side, _) = line.split_once("is redirected to internal")?;
        let words: Vec<&str> = external_side.split_whitespace().collect();
        if !words.contains(&protocol.as_str()) {
            return None;
        }
        words.iter().find_map(|word| word.parse::<SocketAddrV4>().ok())
    })
}

/// Check whether a redirect confirmation matches what was requested.
pub fn confirms_mapping(
    output: &str,
    protocol: Protocol,
    external_ip: Ipv4Addr,
    external_port: u16,
) -> bool {
    parse_redirect(output, protocol)
        .map(|addr| *addr.ip() == external_ip && addr.port() == external_port)
        .unwrap_or(false)
}

/// Check for the delete confirmation (`UPNP_DeletePortMapping() returned : 0`).
pub fn confirms_delete(output: &str) -> bool {
    output.lines().any(|line| {
        line.split_once("UPNP_DeletePortMapping()")
            .and_then(|(_, rest)| rest.trim().strip_prefix("returned"))
            .map(|code| code.trim().trim_start_matches(':').trim() == "0")
            .unwrap_or(false)
    })
}
