//! Connection orchestrator.
//!
//! Sequences mapping, service start and registration on connect, and the
//! reverse on disconnect. Transitions come from the pure state machine in
//! `flingr-core`; this module only interprets the actions it returns.

use flingr_core::{Action, Event, DEFAULT_TEMPLATE};
use flingr_types::{Endpoint, FlingrError};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::nat::NatTraversalController;
use crate::probe::NetworkProbe;
use crate::refresh::{spawn_refresh_task, RefreshHandle, DEFAULT_REFRESH_INTERVAL};
use crate::rendezvous::RendezvousClient;
use crate::service::EndpointServiceController;
use crate::session::{ConnectionStatus, Session};

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Another connect or disconnect is running.
    #[error("another connect or disconnect is in progress")]
    Busy,

    /// Connect was called while not disconnected.
    #[error("already connected")]
    AlreadyConnected,

    /// Connect was refused before anything changed.
    #[error(transparent)]
    Rejected(#[from] FlingrError),
}

/// Orchestrator behaviour.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Point the service at the rendered config before starting it.
    pub auto_configure: bool,
    /// Time between re-registrations.
    pub refresh_interval: Duration,
    /// sshd_config template the service config is rendered from.
    pub template: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            auto_configure: true,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// How the endpoint is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectMode {
    /// Ask the gateway for the LAN address and draw a random external port.
    Auto {
        /// Port the daemon listens on.
        local_port: u16,
    },
    /// Use values entered by the user, validated before anything runs.
    Manual {
        /// LAN IPv4 address as typed.
        local_address: String,
        /// Port the daemon listens on.
        local_port: u32,
        /// Port to open on the gateway.
        external_port: u32,
    },
}

/// Parameters of one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Endpoint selection.
    pub mode: ConnectMode,
    /// Publish the endpoint to the rendezvous store.
    pub register: bool,
    /// Directory served over SFTP; must exist.
    pub root_directory: Option<PathBuf>,
}

/// Result of [`ConnectionOrchestrator::prepare`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareReport {
    /// Daemon executable, if it could be located.
    pub executable: Option<PathBuf>,
    /// An install ran and succeeded during this call.
    pub installed: bool,
    /// Why the daemon is not ready, if it is not.
    pub reason: Option<String>,
}

/// Drives connect and disconnect.
pub struct ConnectionOrchestrator {
    nat: Arc<NatTraversalController>,
    service: Arc<EndpointServiceController>,
    rendezvous: Arc<RendezvousClient>,
    probe: Arc<dyn NetworkProbe>,
    settings: OrchestratorSettings,
    session: Arc<Session>,
    /// Held for the whole of a connect or disconnect; owns the refresh task.
    operation: Mutex<Option<RefreshHandle>>,
    executable: StdMutex<Option<PathBuf>>,
}

impl ConnectionOrchestrator {
    /// Create an orchestrator in the Disconnected state.
    pub fn new(
        nat: Arc<NatTraversalController>,
        service: Arc<EndpointServiceController>,
        rendezvous: Arc<RendezvousClient>,
        probe: Arc<dyn NetworkProbe>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            nat,
            service,
            rendezvous,
            probe,
            settings,
            session: Arc::new(Session::new()),
            operation: Mutex::new(None),
            executable: StdMutex::new(None),
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.session.snapshot()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.session.subscribe()
    }

    /// Make sure the daemon is present: locate it, else install it.
    ///
    /// The executable found is used when pointing the service at its config.
    pub async fn prepare(&self) -> PrepareReport {
        if let Some(executable) = self.service.locate_executable().await {
            self.remember_executable(&executable);
            return PrepareReport {
                executable: Some(executable),
                installed: false,
                reason: None,
            };
        }

        if !self.probe.is_available().await {
            tracing::warn!("daemon not found and network unavailable; skipping install");
            return PrepareReport {
                executable: None,
                installed: false,
                reason: Some(FlingrError::NetworkUnavailable.to_string()),
            };
        }

        if !self.service.install().await {
            return PrepareReport {
                executable: None,
                installed: false,
                reason: Some("daemon could not be installed".to_string()),
            };
        }

        let executable = self.service.locate_executable().await;
        if let Some(executable) = &executable {
            self.remember_executable(executable);
        }
        let reason = executable
            .is_none()
            .then(|| "daemon installed but not found in the service definition".to_string());
        PrepareReport {
            executable,
            installed: true,
            reason,
        }
    }

    /// Run [`prepare`](Self::prepare) on a background task.
    pub fn spawn_prepare(self: &Arc<Self>) -> JoinHandle<PrepareReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.prepare().await })
    }

    /// Establish the connection.
    ///
    /// Returns once the sequence has settled: connected (possibly degraded or
    /// unregistered) or back to disconnected with a reason in the status.
    /// Rejections leave the state untouched.
    pub async fn connect(&self, request: ConnectRequest) -> Result<(), OrchestratorError> {
        let mut refresh = self
            .operation
            .try_lock()
            .map_err(|_| OrchestratorError::Busy)?;
        if !self.session.snapshot().state.is_disconnected() {
            return Err(OrchestratorError::AlreadyConnected);
        }
        if !self.probe.is_available().await {
            tracing::warn!("connect refused: network unavailable");
            return Err(FlingrError::NetworkUnavailable.into());
        }

        if let Some(dir) = &request.root_directory {
            check_root_directory(dir).await?;
        }
        let endpoint = self.resolve_endpoint(&request.mode).await?;

        tracing::info!(%endpoint, register = request.register, "connecting");
        self.session.begin(endpoint, request.register);
        let actions = self.session.apply(Event::ConnectRequested {
            register: request.register,
        });
        self.execute(&mut refresh, request.root_directory.as_deref(), actions)
            .await;
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// Every step is attempted whatever the previous ones returned; the
    /// state always ends Disconnected. Waits for a running connect.
    pub async fn disconnect(&self) {
        let mut refresh = self.operation.lock().await;
        if !self.session.snapshot().state.is_connected() {
            tracing::debug!("disconnect ignored: not connected");
            return;
        }

        let actions = self.session.apply(Event::DisconnectRequested);
        self.execute(&mut refresh, None, actions).await;
        let actions = self.session.apply(Event::DisconnectFinished);
        self.execute(&mut refresh, None, actions).await;

        if let Some(handle) = refresh.take() {
            handle.stop().await;
        }
    }

    async fn resolve_endpoint(&self, mode: &ConnectMode) -> Result<Endpoint, FlingrError> {
        match mode {
            ConnectMode::Manual {
                local_address,
                local_port,
                external_port,
            } => Endpoint::from_user_input(local_address, *local_port, *external_port),
            ConnectMode::Auto { local_port } => {
                let local_address = self.discover_local_ip().await?;
                Endpoint::with_random_external_port(local_address, *local_port)
            }
        }
    }

    async fn discover_local_ip(&self) -> Result<Ipv4Addr, FlingrError> {
        self.nat
            .discover_local_ip()
            .await
            .ok_or_else(|| FlingrError::ToolInvocation {
                tool: "upnpc".into(),
                reason: "gateway did not report a LAN address".into(),
            })
    }

    async fn execute(
        &self,
        refresh: &mut Option<RefreshHandle>,
        root_directory: Option<&Path>,
        actions: Vec<Action>,
    ) {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            tracing::debug!(?action, "executing");
            let event = match action {
                Action::AddMapping => Some(self.add_mapping().await),
                Action::ConfigureAndStartService => {
                    Some(self.configure_and_start(root_directory).await)
                }
                Action::Register => Some(self.register().await),
                Action::StartRefresh => {
                    if refresh.is_none() {
                        if let Some(endpoint) = self.session.endpoint() {
                            *refresh = Some(spawn_refresh_task(
                                Arc::clone(&self.rendezvous),
                                Arc::clone(&self.session),
                                endpoint,
                                self.settings.refresh_interval,
                            ));
                        }
                    }
                    None
                }
                Action::StopRefresh => {
                    if let Some(handle) = refresh.take() {
                        handle.stop().await;
                    }
                    None
                }
                Action::Unregister => {
                    // Read after StopRefresh so a late refresh id is included.
                    if let Some(id) = self.session.registration_id() {
                        self.rendezvous.unregister(&id).await;
                    }
                    None
                }
                Action::StopService => {
                    self.service.stop().await;
                    None
                }
                Action::RemoveMapping => {
                    if let Some(endpoint) = self.session.endpoint() {
                        self.nat.remove_mapping(endpoint.external_port()).await;
                    }
                    None
                }
                Action::Notify(_) => None,
            };

            if let Some(event) = event {
                queue.extend(self.session.apply(event));
            }
        }
    }

    async fn add_mapping(&self) -> Event {
        let Some(endpoint) = self.session.endpoint() else {
            return Event::MappingFinished {
                outcome: flingr_types::MappingOutcome::None,
            };
        };
        let result = self.nat.add_mapping(&endpoint).await;
        if let Some(ip) = result.external_ip {
            self.session.set_external_address(ip);
        }
        Event::MappingFinished {
            outcome: result.outcome(),
        }
    }

    async fn configure_and_start(&self, root_directory: Option<&Path>) -> Event {
        let listen_address = self.session.endpoint().map(|e| e.local_address());
        if let Err(e) = self
            .service
            .apply_config(listen_address, root_directory, &self.settings.template)
            .await
        {
            return Event::ServiceFailed {
                reason: e.to_string(),
            };
        }

        if self.settings.auto_configure {
            let executable = self.executable_path().await;
            if !self.service.point_service_at_config(&executable).await {
                tracing::warn!(
                    executable = %executable.display(),
                    "could not point service at config; starting with its current definition"
                );
            }
        }

        if self.service.start().await {
            Event::ServiceStarted
        } else {
            Event::ServiceFailed {
                reason: "service did not confirm start".to_string(),
            }
        }
    }

    async fn register(&self) -> Event {
        let Some(endpoint) = self.session.endpoint() else {
            return Event::RegisterFailed {
                reason: "no endpoint".to_string(),
            };
        };
        match self.rendezvous.register(&endpoint).await {
            Ok(id) => Event::RegisterSucceeded { id },
            Err(e) => Event::RegisterFailed {
                reason: FlingrError::from(&e).to_string(),
            },
        }
    }

    /// Prepared executable, else the located one, else the configured default.
    async fn executable_path(&self) -> PathBuf {
        if let Some(path) = self.remembered_executable() {
            return path;
        }
        if let Some(path) = self.service.locate_executable().await {
            self.remember_executable(&path);
            return path;
        }
        self.service.settings().default_executable.clone()
    }

    fn remember_executable(&self, path: &Path) {
        if let Ok(mut slot) = self.executable.lock() {
            *slot = Some(path.to_path_buf());
        }
    }

    fn remembered_executable(&self) -> Option<PathBuf> {
        self.executable.lock().ok().and_then(|slot| slot.clone())
    }
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("settings", &self.settings)
            .field("status", &self.session.snapshot())
            .finish_non_exhaustive()
    }
}

async fn check_root_directory(dir: &Path) -> Result<(), FlingrError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(FlingrError::Validation(format!(
            "root directory is not a directory: {}",
            dir.display()
        ))),
        Err(_) => Err(FlingrError::Validation(format!(
            "root directory does not exist: {}",
            dir.display()
        ))),
    }
}
