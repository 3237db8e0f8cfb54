//! Background re-registration.
//!
//! While connected with registration requested, the endpoint is registered
//! again on a fixed interval so the published record stays current. The
//! task never gives up on failure; it just waits for the next tick.

use flingr_core::Event;
use flingr_types::Endpoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::rendezvous::RendezvousClient;
use crate::session::Session;

/// Default time between re-registrations (180.1 s).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(180_100);

/// Handle to a running refresh task.
#[derive(Debug)]
pub(crate) struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signal the task and wait for it to exit.
    ///
    /// A registration already in flight is dropped; whatever record it may
    /// have created is left to expire in the store.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "refresh task ended abnormally");
        }
    }
}

/// Spawn the refresh task for `endpoint`.
///
/// The first attempt happens one full `period` after spawning. A zero
/// period falls back to [`DEFAULT_REFRESH_INTERVAL`].
pub(crate) fn spawn_refresh_task(
    rendezvous: Arc<RendezvousClient>,
    session: Arc<Session>,
    endpoint: Endpoint,
    period: Duration,
) -> RefreshHandle {
    let period = if period.is_zero() {
        tracing::warn!(
            default_ms = DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            "zero refresh interval, using default"
        );
        DEFAULT_REFRESH_INTERVAL
    } else {
        period
    };
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracing::info!(interval_ms = period.as_millis() as u64, "refresh task started");

        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = timer.tick() => {}
            }

            if *shutdown_rx.borrow() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    tracing::info!("refresh interrupted; any record it created is left to expire");
                    break;
                }
                result = rendezvous.register(&endpoint) => result,
            };

            let event = match result {
                Ok(id) => Event::RefreshSucceeded { id },
                Err(e) => Event::RefreshFailed {
                    reason: e.to_string(),
                },
            };
            session.apply(event);
        }

        tracing::info!("refresh task stopped");
    });

    RefreshHandle { shutdown, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendezvous::tests::test_client;
    use crate::transport::MockHttpTransport;
    use flingr_types::{MappingOutcome, RegistrationId};
    use std::net::Ipv4Addr;

    fn endpoint() -> Endpoint {
        let mut endpoint = Endpoint::new(Ipv4Addr::new(192, 168, 1, 10), 22, 51413).unwrap();
        endpoint.set_external_address(Ipv4Addr::new(203, 0, 113, 5));
        endpoint
    }

    fn connected_session() -> Arc<Session> {
        let session = Arc::new(Session::new());
        session.begin(endpoint(), true);
        session.apply(Event::ConnectRequested { register: true });
        session.apply(Event::MappingFinished {
            outcome: MappingOutcome::Full,
        });
        session.apply(Event::ServiceStarted);
        session.apply(Event::RegisterSucceeded {
            id: RegistrationId::new("first").unwrap(),
        });
        session
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_sends_nothing() {
        let transport = MockHttpTransport::new();
        let session = connected_session();
        let handle = spawn_refresh_task(
            Arc::new(test_client(transport.clone())),
            session,
            endpoint(),
            DEFAULT_REFRESH_INTERVAL,
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.stop().await;

        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn each_tick_overwrites_id() {
        let transport = MockHttpTransport::new();
        transport.queue_response(200, r#"{"Item":{"id":{"S":"second"}}}"#);
        transport.queue_response(200, r#"{"Item":{"id":{"S":"third"}}}"#);
        let session = connected_session();
        let handle = spawn_refresh_task(
            Arc::new(test_client(transport.clone())),
            Arc::clone(&session),
            endpoint(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.stop().await;

        assert_eq!(transport.request_count(), 2);
        assert_eq!(
            session.registration_id(),
            Some(RegistrationId::new("third").unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_id_and_retries() {
        let transport = MockHttpTransport::new();
        transport.queue_response(500, r#"{"message":"Internal server error"}"#);
        transport.queue_response(200, r#"{"Item":{"id":{"S":"recovered"}}}"#);
        let session = connected_session();
        let handle = spawn_refresh_task(
            Arc::new(test_client(transport.clone())),
            Arc::clone(&session),
            endpoint(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(
            session.registration_id(),
            Some(RegistrationId::new("first").unwrap())
        );
        assert!(session.snapshot().reason.is_some());

        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.stop().await;
        assert_eq!(
            session.registration_id(),
            Some(RegistrationId::new("recovered").unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_stalled_registration() {
        let transport = MockHttpTransport::new();
        transport.queue_stall();
        let session = connected_session();
        let handle = spawn_refresh_task(
            Arc::new(test_client(transport.clone())),
            Arc::clone(&session),
            endpoint(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.request_count(), 1);

        let stopped = tokio::time::timeout(Duration::from_secs(1), handle.stop()).await;
        assert!(stopped.is_ok());
        assert_eq!(
            session.registration_id(),
            Some(RegistrationId::new("first").unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_uses_default() {
        let transport = MockHttpTransport::new();
        transport.queue_response(200, r#"{"Item":{"id":{"S":"second"}}}"#);
        let session = connected_session();
        let handle = spawn_refresh_task(
            Arc::new(test_client(transport.clone())),
            Arc::clone(&session),
            endpoint(),
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.request_count(), 0);

        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL).await;
        handle.stop().await;
        assert_eq!(transport.request_count(), 1);
        assert_eq!(
            session.registration_id(),
            Some(RegistrationId::new("second").unwrap())
        );
    }
}
