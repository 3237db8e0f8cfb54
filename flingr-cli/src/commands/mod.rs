//! CLI command implementations.

pub mod connect;
pub mod locate;
pub mod lookup;

use anyhow::{Context, Result};
use flingr_client::{
    CommandRunner, EndpointServiceController, HttpTransport, NatTraversalController,
    NetworkProbe, ProcessRunner, RendezvousClient, ReqwestTransport, ResolveProbe,
};
use flingr_core::{
    CredentialProvider, Credentials, EnvCredentials, RequestSigner, SigningConfig,
    StaticCredentials,
};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;

/// Controllers wired from configuration.
pub struct Components {
    /// Gateway port mappings.
    pub nat: Arc<NatTraversalController>,
    /// Daemon control.
    pub service: Arc<EndpointServiceController>,
    /// Rendezvous store.
    pub rendezvous: Arc<RendezvousClient>,
    /// Network availability.
    pub probe: Arc<dyn NetworkProbe>,
}

impl Components {
    /// Wire real child processes and HTTP.
    pub fn from_config(config: &Config, working_dir: &Path) -> Result<Self> {
        let transport =
            ReqwestTransport::new(config.rendezvous.timeout()).context("Failed to build HTTP client")?;
        let probe = ResolveProbe::new(config.rendezvous.host.clone(), config.rendezvous.timeout());
        Ok(Self::with_seams(
            config,
            working_dir,
            Arc::new(ProcessRunner::new()),
            Arc::new(transport),
            Arc::new(probe),
        ))
    }

    /// Wire the given seams.
    pub fn with_seams(
        config: &Config,
        working_dir: &Path,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn HttpTransport>,
        probe: Arc<dyn NetworkProbe>,
    ) -> Self {
        let signing = SigningConfig {
            service: config.rendezvous.service.clone(),
            ..SigningConfig::execute_api(config.rendezvous.host.clone(), config.rendezvous.region.clone())
        };
        let signer = RequestSigner::new(signing, credential_provider(config));

        Self {
            nat: Arc::new(NatTraversalController::new(
                Arc::clone(&runner),
                config.nat.upnpc.clone(),
            )),
            service: Arc::new(EndpointServiceController::new(
                runner,
                config.service.settings(working_dir),
            )),
            rendezvous: Arc::new(RendezvousClient::new(
                config.rendezvous.store(),
                signer,
                transport,
            )),
            probe,
        }
    }
}

/// Credentials from the config file, else from the environment.
fn credential_provider(config: &Config) -> Arc<dyn CredentialProvider> {
    match (
        &config.credentials.access_key_id,
        &config.credentials.secret_access_key,
    ) {
        (Some(access), Some(secret)) => Arc::new(StaticCredentials::new(Credentials::new(
            access.clone(),
            secret.clone(),
        ))),
        _ => Arc::new(EnvCredentials),
    }
}
