//! Connect, stay connected, disconnect.

use anyhow::{Context, Result};
use flingr_client::{
    ConnectMode, ConnectRequest, ConnectionOrchestrator, ConnectionStatus, OrchestratorSettings,
};
use flingr_core::DEFAULT_TEMPLATE;
use flingr_types::random_external_port;
use std::future::Future;
use std::sync::Arc;

use super::Components;
use crate::config::{Config, ConnectionSection};

/// Run the connect command until `shutdown` resolves.
pub async fn run(
    config: &Config,
    components: Components,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let request = connect_request(&config.connection)?;
    let settings = OrchestratorSettings {
        auto_configure: config.connection.auto_configure,
        refresh_interval: config.connection.refresh_interval(),
        template: load_template(config).await?,
    };

    let orchestrator = Arc::new(ConnectionOrchestrator::new(
        components.nat,
        components.service,
        components.rendezvous,
        components.probe,
        settings,
    ));

    tokio::pin!(shutdown);

    let report = tokio::select! {
        report = orchestrator.spawn_prepare() => report.context("Prepare task failed")?,
        _ = &mut shutdown => {
            println!("Interrupted before connecting.");
            return Ok(());
        }
    };
    match (&report.executable, &report.reason) {
        (Some(path), _) => println!("Daemon:   {}", path.display()),
        (None, Some(reason)) => println!("Daemon:   not ready ({})", reason),
        (None, None) => println!("Daemon:   not found"),
    }

    let mut status = orchestrator.subscribe();
    let mut connecting = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.connect(request).await }
    });

    let connected = tokio::select! {
        result = &mut connecting => result,
        _ = &mut shutdown => {
            // Let the connect settle so whatever it set up is torn down.
            println!("Interrupted while connecting, disconnecting...");
            let _ = connecting.await;
            orchestrator.disconnect().await;
            print_status(&orchestrator.status());
            return Ok(());
        }
    };
    connected
        .context("Connect task failed")?
        .context("Connect refused")?;

    let current = orchestrator.status();
    print_status(&current);
    if current.state.is_disconnected() {
        anyhow::bail!(
            "Connect failed: {}",
            current.reason.as_deref().unwrap_or("unknown reason")
        );
    }

    println!();
    println!("Connected. Press Ctrl+C to disconnect.");
    let _ = status.borrow_and_update();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                print_status(&snapshot);
            }
        }
    }

    println!("Disconnecting...");
    orchestrator.disconnect().await;
    print_status(&orchestrator.status());
    Ok(())
}

/// Build the connect request from configuration.
pub fn connect_request(connection: &ConnectionSection) -> Result<ConnectRequest> {
    let mode = match &connection.local_address {
        Some(local_address) => ConnectMode::Manual {
            local_address: local_address.clone(),
            local_port: connection.local_port,
            external_port: connection
                .external_port
                .unwrap_or_else(|| u32::from(random_external_port())),
        },
        None => ConnectMode::Auto {
            local_port: u16::try_from(connection.local_port)
                .ok()
                .filter(|port| *port != 0)
                .with_context(|| format!("Invalid local port: {}", connection.local_port))?,
        },
    };

    Ok(ConnectRequest {
        mode,
        register: connection.register,
        root_directory: connection.root_directory.clone(),
    })
}

async fn load_template(config: &Config) -> Result<String> {
    match &config.service.template {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template {}", path.display())),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

fn print_status(status: &ConnectionStatus) {
    println!("State:    {}", status.state.name());
    if let Some(endpoint) = &status.endpoint {
        println!("Endpoint: {}", endpoint);
    }
    if let Some(record) = &status.record {
        match &record.id {
            Some(id) => println!("Record:   {}", id),
            None => println!("Record:   (not registered)"),
        }
    }
    if let Some(reason) = &status.reason {
        println!("Reason:   {}", reason);
    }
}
