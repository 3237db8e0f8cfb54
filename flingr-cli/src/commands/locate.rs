//! Locate (and optionally install) the daemon.

use anyhow::Result;
use flingr_client::{ConnectionOrchestrator, OrchestratorSettings};

use super::Components;
use crate::config::Config;

/// Run the locate command.
pub async fn run(config: &Config, components: Components, install: bool) -> Result<()> {
    if !install {
        return match components.service.locate_executable().await {
            Some(path) => {
                println!("{}", path.display());
                Ok(())
            }
            None => anyhow::bail!(
                "{} not found; default location is {}",
                config.service.name,
                config.service.default_executable.display()
            ),
        };
    }

    let orchestrator = ConnectionOrchestrator::new(
        components.nat,
        components.service,
        components.rendezvous,
        components.probe,
        OrchestratorSettings::default(),
    );
    let report = orchestrator.prepare().await;
    if report.installed {
        println!("Installed {}", config.service.name);
    }
    match (report.executable, report.reason) {
        (Some(path), _) => {
            println!("{}", path.display());
            Ok(())
        }
        (None, Some(reason)) => anyhow::bail!(reason),
        (None, None) => anyhow::bail!("{} not found", config.service.name),
    }
}
