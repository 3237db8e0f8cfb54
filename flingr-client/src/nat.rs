//! NAT traversal through the gateway's UPnP IGD, driven by `upnpc`.
//!
//! One mapping per protocol (TCP, then UDP) is requested per connection
//! attempt. A protocol counts as mapped only when `upnpc` confirms the exact
//! external `ip:port` that was asked for.

use flingr_core::upnpc;
use flingr_types::{Endpoint, MappingResult, MappingState, PortMapping, Protocol};
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::command::CommandRunner;

/// Default `upnpc` executable name.
pub const DEFAULT_UPNPC: &str = "upnpc";

/// Adds and removes gateway port mappings.
pub struct NatTraversalController {
    runner: Arc<dyn CommandRunner>,
    upnpc: String,
}

impl NatTraversalController {
    /// Create a controller that runs the `upnpc` executable at `upnpc`.
    pub fn new(runner: Arc<dyn CommandRunner>, upnpc: impl Into<String>) -> Self {
        Self {
            runner,
            upnpc: upnpc.into(),
        }
    }

    /// Ask the gateway which LAN address this machine has.
    pub async fn discover_local_ip(&self) -> Option<Ipv4Addr> {
        let output = self.run(upnpc::discover_args()).await?;
        let ip = upnpc::parse_local_ip(&output);
        match ip {
            Some(ip) => tracing::info!(%ip, "discovered LAN address"),
            None => tracing::warn!("upnpc did not report a LAN address"),
        }
        ip
    }

    /// Map `endpoint` for TCP and UDP.
    ///
    /// Never fails outright: every protocol ends up `Mapped` or `Failed` and
    /// the caller inspects [`MappingResult::outcome`].
    pub async fn add_mapping(&self, endpoint: &Endpoint) -> MappingResult {
        let mut external_ip = None;
        let mut mappings = Vec::with_capacity(Protocol::ALL.len());

        for protocol in Protocol::ALL {
            let mut mapping = PortMapping::new(protocol, *endpoint);
            let args = upnpc::add_args(
                endpoint.local_address(),
                endpoint.local_port(),
                endpoint.external_port(),
                protocol,
            );

            mapping.state = match self.run(args).await {
                Some(output) => {
                    if let Some(ip) = upnpc::parse_external_ip(&output) {
                        external_ip = Some(ip);
                    }
                    let confirmed = external_ip
                        .map(|ip| {
                            upnpc::confirms_mapping(
                                &output,
                                protocol,
                                ip,
                                endpoint.external_port(),
                            )
                        })
                        .unwrap_or(false);
                    if confirmed {
                        MappingState::Mapped
                    } else {
                        MappingState::Failed
                    }
                }
                None => MappingState::Failed,
            };

            if let Some(ip) = external_ip {
                mapping.endpoint.set_external_address(ip);
            }
            match mapping.state {
                MappingState::Mapped => tracing::info!(
                    %protocol,
                    endpoint = %mapping.endpoint,
                    "port mapping confirmed"
                ),
                _ => tracing::warn!(
                    %protocol,
                    external_port = endpoint.external_port(),
                    "port mapping not confirmed"
                ),
            }
            mappings.push(mapping);
        }

        MappingResult {
            mappings,
            external_ip,
            external_port: endpoint.external_port(),
        }
    }

    /// Remove the TCP and UDP mappings for `external_port`.
    ///
    /// Returns true only if the gateway confirmed every delete. A mapping
    /// that never existed yields false, never an error, so this is safe to
    /// call on every disconnect.
    pub async fn remove_mapping(&self, external_port: u16) -> bool {
        if external_port == 0 {
            return false;
        }

        let mut all_deleted = true;
        for protocol in Protocol::ALL {
            let deleted = match self.run(upnpc::delete_args(external_port, protocol)).await {
                Some(output) => upnpc::confirms_delete(&output),
                None => false,
            };
            if deleted {
                tracing::info!(%protocol, external_port, "port mapping removed");
            } else {
                tracing::warn!(%protocol, external_port, "port mapping not removed");
            }
            all_deleted &= deleted;
        }
        all_deleted
    }

    async fn run(&self, args: Vec<String>) -> Option<String> {
        match self.runner.run(&self.upnpc, &args).await {
            Ok(output) => Some(output.text()),
            Err(e) => {
                tracing::error!(error = %e, "upnpc could not be run");
                None
            }
        }
    }
}

impl std::fmt::Debug for NatTraversalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatTraversalController")
            .field("upnpc", &self.upnpc)
            .finish_non_exhaustive()
    }
}
