//! # flingr-client
//!
//! Makes a machine behind a NAT reachable over SFTP and publishes where it
//! can be found.
//!
//! ## Features
//!
//! - **Port Mapping**: TCP and UDP mappings through the gateway's UPnP IGD (`upnpc`)
//! - **Service Control**: renders `sshd_config`, starts/stops/installs `sshd`
//! - **Rendezvous**: SigV4-signed register/unregister/lookup with periodic refresh
//! - **Pure State Machine**: transitions come from flingr-core; this crate runs the actions
//! - **Pluggable Seams**: command runner, HTTP transport and network probe (real, mock)
//!
//! ## Example
//!
//! ```ignore
//! use flingr_client::{ConnectMode, ConnectRequest, ConnectionOrchestrator};
//!
//! let orchestrator = ConnectionOrchestrator::new(nat, service, rendezvous, probe, settings);
//! orchestrator.spawn_prepare();
//!
//! orchestrator
//!     .connect(ConnectRequest {
//!         mode: ConnectMode::Auto { local_port: 22 },
//!         register: true,
//!         root_directory: None,
//!     })
//!     .await?;
//!
//! let mut status = orchestrator.subscribe();
//! // ...
//! orchestrator.disconnect().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod nat;
pub mod orchestrator;
pub mod probe;
pub mod refresh;
pub mod rendezvous;
pub mod service;
mod session;
pub mod transport;

pub use command::{CommandError, CommandOutput, CommandRunner, MockRunner, ProcessRunner};
pub use nat::{NatTraversalController, DEFAULT_UPNPC};
pub use orchestrator::{
    ConnectMode, ConnectRequest, ConnectionOrchestrator, OrchestratorError, OrchestratorSettings,
    PrepareReport,
};
pub use probe::{NetworkProbe, ResolveProbe, StaticProbe};
pub use refresh::DEFAULT_REFRESH_INTERVAL;
pub use rendezvous::{RendezvousClient, RendezvousConfig, RendezvousError};
pub use service::{ConfigResult, EndpointServiceController, ServiceError, ServiceSettings};
pub use session::ConnectionStatus;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestTransport, TransportError,
};
