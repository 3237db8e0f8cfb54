//! Shared connection status.
//!
//! The state machine lives inside a `watch` channel so every transition is
//! applied under the channel's lock and observers see each snapshot.

use chrono::Utc;
use flingr_core::{Action, ConnectionState, Event, Notice};
use flingr_types::{Endpoint, RegistrationId, RegistrationRecord};
use std::net::Ipv4Addr;
use tokio::sync::watch;

/// Snapshot published to observers after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Endpoint of the current or last attempt.
    pub endpoint: Option<Endpoint>,
    /// Rendezvous record; absent when registration is not in use.
    pub record: Option<RegistrationRecord>,
    /// Last failure reason, cleared by a new connect or a successful refresh.
    pub reason: Option<String>,
}

impl ConnectionStatus {
    /// Live registration id, if any.
    pub fn registration_id(&self) -> Option<&RegistrationId> {
        self.record.as_ref().and_then(|record| record.id.as_ref())
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    status: watch::Sender<ConnectionStatus>,
}

impl Session {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self { status }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn snapshot(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn endpoint(&self) -> Option<Endpoint> {
        self.status.borrow().endpoint
    }

    pub(crate) fn registration_id(&self) -> Option<RegistrationId> {
        self.status.borrow().state.registration_id().cloned()
    }

    /// Start a new attempt for `endpoint`.
    pub(crate) fn begin(&self, endpoint: Endpoint, register: bool) {
        self.status.send_modify(|status| {
            status.endpoint = Some(endpoint);
            status.record = register.then(|| RegistrationRecord::unregistered(endpoint));
            status.reason = None;
        });
    }

    pub(crate) fn set_external_address(&self, address: Ipv4Addr) {
        self.status.send_modify(|status| {
            if let Some(endpoint) = status.endpoint.as_mut() {
                endpoint.set_external_address(address);
            }
            if let Some(record) = status.record.as_mut() {
                record.endpoint.set_external_address(address);
            }
        });
    }

    /// Feed `event` to the state machine and return the actions to run.
    ///
    /// Notices are absorbed here: they only update the published reason.
    pub(crate) fn apply(&self, event: Event) -> Vec<Action> {
        let granted = match &event {
            Event::RegisterSucceeded { id } | Event::RefreshSucceeded { id } => Some(id.clone()),
            _ => None,
        };
        let mut actions = Vec::new();

        self.status.send_modify(|status| {
            let previous = std::mem::take(&mut status.state);
            let from = previous.name();
            let (next, produced) = previous.on_event(event);
            if next.name() != from {
                tracing::info!(from, to = next.name(), "connection state changed");
            }

            if let Some(id) = granted {
                if next.registration_id() == Some(&id) {
                    if let Some(record) = status.record.as_mut() {
                        record.refresh(id, Utc::now());
                    }
                    status.reason = None;
                }
            }
            if next.is_disconnected() {
                status.record = None;
            }
            status.state = next;

            for action in produced {
                match action {
                    Action::Notify(notice) => note(status, notice),
                    action => actions.push(action),
                }
            }
        });
        actions
    }
}

fn note(status: &mut ConnectionStatus, notice: Notice) {
    match notice {
        Notice::MappingDegraded => {
            tracing::warn!("only some protocols are mapped; connection is degraded");
        }
        Notice::Connected => {
            if let Some(endpoint) = &status.endpoint {
                tracing::info!(%endpoint, "connected");
            }
        }
        Notice::ConnectFailed { reason } => {
            tracing::error!(%reason, "connect failed");
            status.reason = Some(reason);
        }
        Notice::RegistrationFailed { reason } => {
            tracing::warn!(%reason, "registration failed; refresh will retry");
            status.reason = Some(reason);
        }
        Notice::RefreshFailed { reason } => {
            tracing::warn!(%reason, "refresh failed; keeping previous id");
            status.reason = Some(reason);
        }
        Notice::Disconnected => tracing::info!("disconnected"),
    }
}
