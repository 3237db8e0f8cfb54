//! Connection state machine for Flingr.
//!
//! This module provides a pure, side-effect-free state machine for the
//! connect/disconnect lifecycle. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! The actual I/O (port mapping, service control, rendezvous calls) is
//! performed by flingr-client, not by this module.
//!
//! ```text
//! Disconnected ──Connect──▶ Mapping ──Full/Partial──▶ ServiceStarting
//!      ▲                      │                          │        │
//!      │                    None                   started   failed (rollback)
//!      │                      ▼                          ▼        ▼
//!      ├──────────────── Disconnected        Registering ─▶ Connected
//!      │                                                      │
//!      └──────── Disconnecting ◀──────────Disconnect──────────┘
//! ```

use flingr_types::{MappingOutcome, RegistrationId};

/// Whether and how the connection is published to the rendezvous store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The user did not ask for registration.
    NotRequested,
    /// Registration was requested but no attempt has succeeded yet.
    Unregistered,
    /// The store holds a record with this id.
    Active(RegistrationId),
}

impl Registration {
    /// The live record id, if any.
    pub fn id(&self) -> Option<&RegistrationId> {
        match self {
            Registration::Active(id) => Some(id),
            _ => None,
        }
    }

    /// Check whether the refresh loop should run.
    pub fn is_requested(&self) -> bool {
        !matches!(self, Registration::NotRequested)
    }
}

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing is mapped or running.
    Disconnected,
    /// Waiting for the gateway to confirm the port mappings.
    Mapping {
        /// Whether to register once the service is up.
        register: bool,
    },
    /// Writing the service config and starting the daemon.
    ServiceStarting {
        /// How much of the mapping succeeded.
        mapping: MappingOutcome,
        /// Whether to register once the service is up.
        register: bool,
    },
    /// Waiting for the first rendezvous registration.
    Registering {
        /// How much of the mapping succeeded.
        mapping: MappingOutcome,
    },
    /// The service is reachable.
    Connected {
        /// How much of the mapping succeeded.
        mapping: MappingOutcome,
        /// Rendezvous status.
        registration: Registration,
    },
    /// Tearing down in reverse order.
    Disconnecting {
        /// Record to unregister, updated by late refresh results.
        registration: Option<RegistrationId>,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (flingr-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested { register }) => {
                (Self::Mapping { register }, vec![Action::AddMapping])
            }

            // From Mapping
            (Self::Mapping { register }, Event::MappingFinished { outcome }) => match outcome {
                MappingOutcome::Full => (
                    Self::ServiceStarting {
                        mapping: outcome,
                        register,
                    },
                    vec![Action::ConfigureAndStartService],
                ),
                MappingOutcome::Partial => (
                    Self::ServiceStarting {
                        mapping: outcome,
                        register,
                    },
                    vec![
                        Action::Notify(Notice::MappingDegraded),
                        Action::ConfigureAndStartService,
                    ],
                ),
                MappingOutcome::None => (
                    Self::Disconnected,
                    vec![Action::Notify(Notice::ConnectFailed {
                        reason: "gateway did not confirm any port mapping".into(),
                    })],
                ),
            },

            // From ServiceStarting
            (Self::ServiceStarting { mapping, register }, Event::ServiceStarted) => {
                if register {
                    (Self::Registering { mapping }, vec![Action::Register])
                } else {
                    (
                        Self::Connected {
                            mapping,
                            registration: Registration::NotRequested,
                        },
                        vec![Action::Notify(Notice::Connected)],
                    )
                }
            }
            (Self::ServiceStarting { .. }, Event::ServiceFailed { reason }) => (
                Self::Disconnected,
                vec![
                    Action::RemoveMapping,
                    Action::Notify(Notice::ConnectFailed { reason }),
                ],
            ),

            // From Registering
            (Self::Registering { mapping }, Event::RegisterSucceeded { id }) => (
                Self::Connected {
                    mapping,
                    registration: Registration::Active(id),
                },
                vec![Action::Notify(Notice::Connected), Action::StartRefresh],
            ),
            (Self::Registering { mapping }, Event::RegisterFailed { reason }) => (
                Self::Connected {
                    mapping,
                    registration: Registration::Unregistered,
                },
                vec![
                    Action::Notify(Notice::RegistrationFailed { reason }),
                    Action::Notify(Notice::Connected),
                    Action::StartRefresh,
                ],
            ),

            // From Connected
            (
                Self::Connected {
                    mapping,
                    registration,
                },
                Event::RefreshSucceeded { id },
            ) if registration.is_requested() => (
                Self::Connected {
                    mapping,
                    registration: Registration::Active(id),
                },
                vec![],
            ),
            (state @ Self::Connected { .. }, Event::RefreshFailed { reason }) => {
                (state, vec![Action::Notify(Notice::RefreshFailed { reason })])
            }
            (Self::Connected { registration, .. }, Event::DisconnectRequested) => {
                let mut actions = Vec::with_capacity(4);
                if registration.is_requested() {
                    actions.push(Action::StopRefresh);
                    actions.push(Action::Unregister);
                }
                actions.push(Action::StopService);
                actions.push(Action::RemoveMapping);
                (
                    Self::Disconnecting {
                        registration: registration.id().cloned(),
                    },
                    actions,
                )
            }

            // From Disconnecting
            (Self::Disconnecting { .. }, Event::RefreshSucceeded { id }) => (
                Self::Disconnecting {
                    registration: Some(id),
                },
                vec![],
            ),
            (Self::Disconnecting { .. }, Event::DisconnectFinished) => (
                Self::Disconnected,
                vec![Action::Notify(Notice::Disconnected)],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if the service is reachable.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if a connect sequence is running.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Mapping { .. } | Self::ServiceStarting { .. } | Self::Registering { .. }
        )
    }

    /// Check if nothing is active.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// The live record id, if any.
    pub fn registration_id(&self) -> Option<&RegistrationId> {
        match self {
            Self::Connected { registration, .. } => registration.id(),
            Self::Disconnecting { registration } => registration.as_ref(),
            _ => None,
        }
    }

    /// Short state name for logs and status lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Mapping { .. } => "mapping",
            Self::ServiceStarting { .. } => "service-starting",
            Self::Registering { .. } => "registering",
            Self::Connected {
                registration: Registration::Unregistered,
                ..
            } => "connected-unregistered",
            Self::Connected { .. } => "connected",
            Self::Disconnecting { .. } => "disconnecting",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// User requested a connection.
    ConnectRequested {
        /// Whether to publish the endpoint to the rendezvous store.
        register: bool,
    },
    /// The gateway answered every mapping request.
    MappingFinished {
        /// How many protocols were confirmed.
        outcome: MappingOutcome,
    },
    /// The daemon confirmed it started.
    ServiceStarted,
    /// Config could not be written or the daemon did not start.
    ServiceFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// First registration returned an id.
    RegisterSucceeded {
        /// Store-assigned id.
        id: RegistrationId,
    },
    /// First registration failed.
    RegisterFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// A periodic re-registration returned an id.
    RefreshSucceeded {
        /// Store-assigned id.
        id: RegistrationId,
    },
    /// A periodic re-registration failed.
    RefreshFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// User requested disconnect.
    DisconnectRequested,
    /// Every teardown step has been attempted.
    DisconnectFinished,
}

/// Actions to be executed by flingr-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Map TCP and UDP on the gateway.
    AddMapping,
    /// Write the service config and start the daemon.
    ConfigureAndStartService,
    /// Register the endpoint with the rendezvous store.
    Register,
    /// Spawn the periodic refresh loop.
    StartRefresh,
    /// Stop the refresh loop and wait for it to exit.
    StopRefresh,
    /// Unregister the record held by the Disconnecting state, if any.
    Unregister,
    /// Stop the daemon.
    StopService,
    /// Remove the gateway mappings.
    RemoveMapping,
    /// Surface something to observers.
    Notify(Notice),
}

/// Outcomes surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Only some protocols were mapped.
    MappingDegraded,
    /// The service is reachable.
    Connected,
    /// Connect ended without a usable connection.
    ConnectFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// First registration failed; the refresh loop keeps trying.
    RegistrationFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// A refresh failed; the previous id stays displayed.
    RefreshFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// Teardown finished.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> RegistrationId {
        RegistrationId::new(value).unwrap()
    }

    fn connected(registration: Registration) -> ConnectionState {
        ConnectionState::Connected {
            mapping: MappingOutcome::Full,
            registration,
        }
    }

    #[test]
    fn starts_disconnected() {
        let state = ConnectionState::new();
        assert!(state.is_disconnected());
        assert_eq!(state.name(), "disconnected");
    }

    #[test]
    fn connect_request_starts_mapping() {
        let (state, actions) =
            ConnectionState::Disconnected.on_event(Event::ConnectRequested { register: true });

        assert_eq!(state, ConnectionState::Mapping { register: true });
        assert_eq!(actions, vec![Action::AddMapping]);
        assert!(state.is_connecting());
    }

    #[test]
    fn full_mapping_starts_service() {
        let (state, actions) = ConnectionState::Mapping { register: false }.on_event(
            Event::MappingFinished {
                outcome: MappingOutcome::Full,
            },
        );

        assert_eq!(
            state,
            ConnectionState::ServiceStarting {
                mapping: MappingOutcome::Full,
                register: false
            }
        );
        assert_eq!(actions, vec![Action::ConfigureAndStartService]);
    }

    #[test]
    fn partial_mapping_is_degraded_but_continues() {
        let (state, actions) = ConnectionState::Mapping { register: true }.on_event(
            Event::MappingFinished {
                outcome: MappingOutcome::Partial,
            },
        );

        assert!(matches!(
            state,
            ConnectionState::ServiceStarting {
                mapping: MappingOutcome::Partial,
                ..
            }
        ));
        assert_eq!(
            actions,
            vec![
                Action::Notify(Notice::MappingDegraded),
                Action::ConfigureAndStartService
            ]
        );
    }

    #[test]
    fn total_mapping_failure_returns_to_disconnected() {
        let (state, actions) = ConnectionState::Mapping { register: true }.on_event(
            Event::MappingFinished {
                outcome: MappingOutcome::None,
            },
        );

        assert!(state.is_disconnected());
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0],
            Action::Notify(Notice::ConnectFailed { .. })
        ));
    }

    #[test]
    fn service_start_without_registration_connects() {
        let (state, actions) = ConnectionState::ServiceStarting {
            mapping: MappingOutcome::Full,
            register: false,
        }
        .on_event(Event::ServiceStarted);

        assert_eq!(state, connected(Registration::NotRequested));
        assert!(!actions.contains(&Action::StartRefresh));
        assert!(!actions.contains(&Action::Register));
    }

    #[test]
    fn service_start_with_registration_registers() {
        let (state, actions) = ConnectionState::ServiceStarting {
            mapping: MappingOutcome::Full,
            register: true,
        }
        .on_event(Event::ServiceStarted);

        assert_eq!(
            state,
            ConnectionState::Registering {
                mapping: MappingOutcome::Full
            }
        );
        assert_eq!(actions, vec![Action::Register]);
    }

    #[test]
    fn service_failure_rolls_back_mapping() {
        let (state, actions) = ConnectionState::ServiceStarting {
            mapping: MappingOutcome::Full,
            register: true,
        }
        .on_event(Event::ServiceFailed {
            reason: "sshd did not start".into(),
        });

        assert!(state.is_disconnected());
        assert_eq!(actions[0], Action::RemoveMapping);
    }

    #[test]
    fn register_success_connects_and_refreshes() {
        let (state, actions) = ConnectionState::Registering {
            mapping: MappingOutcome::Full,
        }
        .on_event(Event::RegisterSucceeded { id: id("abc123") });

        assert_eq!(state, connected(Registration::Active(id("abc123"))));
        assert_eq!(state.registration_id(), Some(&id("abc123")));
        assert!(actions.contains(&Action::StartRefresh));
    }

    #[test]
    fn register_failure_is_connected_unregistered() {
        let (state, actions) = ConnectionState::Registering {
            mapping: MappingOutcome::Full,
        }
        .on_event(Event::RegisterFailed {
            reason: "no Item".into(),
        });

        assert_eq!(state, connected(Registration::Unregistered));
        assert_eq!(state.name(), "connected-unregistered");
        assert!(state.is_connected());
        assert_eq!(state.registration_id(), None);
        assert!(actions.contains(&Action::StartRefresh));
    }

    #[test]
    fn refresh_success_overwrites_id() {
        let state = connected(Registration::Unregistered);
        let (state, _) = state.on_event(Event::RefreshSucceeded { id: id("first") });
        assert_eq!(state.registration_id(), Some(&id("first")));

        let (state, _) = state.on_event(Event::RefreshSucceeded { id: id("second") });
        assert_eq!(state.registration_id(), Some(&id("second")));
    }

    #[test]
    fn refresh_failure_keeps_previous_id() {
        let state = connected(Registration::Active(id("abc123")));
        let (state, actions) = state.on_event(Event::RefreshFailed {
            reason: "timeout".into(),
        });

        assert_eq!(state.registration_id(), Some(&id("abc123")));
        assert!(matches!(
            actions[..],
            [Action::Notify(Notice::RefreshFailed { .. })]
        ));
    }

    #[test]
    fn refresh_ignored_when_not_requested() {
        let state = connected(Registration::NotRequested);
        let (state, _) = state.on_event(Event::RefreshSucceeded { id: id("x") });
        assert_eq!(state, connected(Registration::NotRequested));
    }

    #[test]
    fn disconnect_tears_down_in_reverse_order() {
        let state = connected(Registration::Active(id("abc123")));
        let (state, actions) = state.on_event(Event::DisconnectRequested);

        assert_eq!(
            state,
            ConnectionState::Disconnecting {
                registration: Some(id("abc123"))
            }
        );
        assert_eq!(
            actions,
            vec![
                Action::StopRefresh,
                Action::Unregister,
                Action::StopService,
                Action::RemoveMapping
            ]
        );
    }

    #[test]
    fn disconnect_without_registration_skips_rendezvous() {
        let (_, actions) =
            connected(Registration::NotRequested).on_event(Event::DisconnectRequested);
        assert_eq!(actions, vec![Action::StopService, Action::RemoveMapping]);
    }

    #[test]
    fn late_refresh_while_disconnecting_is_kept_for_unregister() {
        let state = ConnectionState::Disconnecting {
            registration: None,
        };
        let (state, actions) = state.on_event(Event::RefreshSucceeded { id: id("late") });
        assert_eq!(state.registration_id(), Some(&id("late")));
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnecting_always_finishes() {
        let (state, actions) = ConnectionState::Disconnecting {
            registration: Some(id("abc123")),
        }
        .on_event(Event::DisconnectFinished);

        assert!(state.is_disconnected());
        assert_eq!(actions, vec![Action::Notify(Notice::Disconnected)]);
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let (state, actions) =
            ConnectionState::Disconnected.on_event(Event::DisconnectRequested);
        assert!(state.is_disconnected());
        assert!(actions.is_empty());

        let state = connected(Registration::NotRequested);
        let (state, actions) = state.on_event(Event::ConnectRequested { register: true });
        assert!(state.is_connected());
        assert!(actions.is_empty());
    }

    #[test]
    fn full_connect_disconnect_flow() {
        let state = ConnectionState::new();
        let (state, _) = state.on_event(Event::ConnectRequested { register: true });
        let (state, _) = state.on_event(Event::MappingFinished {
            outcome: MappingOutcome::Full,
        });
        let (state, _) = state.on_event(Event::ServiceStarted);
        let (state, _) = state.on_event(Event::RegisterSucceeded { id: id("abc123") });
        assert!(state.is_connected());

        let (state, _) = state.on_event(Event::DisconnectRequested);
        let (state, _) = state.on_event(Event::DisconnectFinished);
        assert!(state.is_disconnected());
    }
}
