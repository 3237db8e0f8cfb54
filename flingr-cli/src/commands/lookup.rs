//! Read a published record.

use anyhow::{Context, Result};
use flingr_client::RendezvousClient;
use flingr_types::{FlingrError, LookupRecord, RegistrationId};

/// Run the lookup command.
pub async fn run(rendezvous: &RendezvousClient, id: &str) -> Result<()> {
    let id = RegistrationId::new(id).context("Registration id must not be empty")?;
    let record = rendezvous
        .lookup(&id)
        .await
        .map_err(|e| FlingrError::from(&e))
        .context("Lookup failed")?;
    print!("{}", format_record(&record));
    Ok(())
}

fn format_record(record: &LookupRecord) -> String {
    let show = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    let mut out = String::new();
    out.push_str(&format!("Id:       {}\n", record.id));
    out.push_str(&format!(
        "External: {}:{}\n",
        show(record.external_address.map(|ip| ip.to_string())),
        show(record.external_port.map(|port| port.to_string()))
    ));
    out.push_str(&format!(
        "Local:    {}:{}\n",
        show(record.local_address.map(|ip| ip.to_string())),
        show(record.local_port.map(|port| port.to_string()))
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::mock_components;
    use crate::config::Config;
    use flingr_client::{MockHttpTransport, MockRunner};
    use std::net::Ipv4Addr;

    #[test]
    fn formats_partial_record() {
        let record = LookupRecord {
            id: RegistrationId::new("abc123").unwrap(),
            external_address: Some(Ipv4Addr::new(203, 0, 113, 5)),
            external_port: Some(51413),
            local_address: None,
            local_port: None,
        };
        assert_eq!(
            format_record(&record),
            "Id:       abc123\nExternal: 203.0.113.5:51413\nLocal:    -:-\n"
        );
    }

    #[tokio::test]
    async fn looks_up_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockHttpTransport::new();
        transport.queue_response(
            200,
            r#"{"Item":{"id":{"S":"abc123"},"ipAddr":{"S":"203.0.113.5"},"wanPort":{"S":"51413"},"lanAddr":{"S":"192.168.1.10"},"lanPort":{"S":"22"}}}"#,
        );
        let mut config = Config::default();
        config.credentials.access_key_id = Some("AKIDEXAMPLE".into());
        config.credentials.secret_access_key = Some("secret".into());
        let components = mock_components(&config, dir.path(), &MockRunner::new(), &transport);

        run(&components.rendezvous, "abc123").await.unwrap();

        let request = transport.last_sent().unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.url.ends_with("/test/FlingrRegistration?Key=abc123"));
    }

    #[tokio::test]
    async fn rejects_blank_id() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockHttpTransport::new();
        let config = Config::default();
        let components = mock_components(&config, dir.path(), &MockRunner::new(), &transport);

        assert!(run(&components.rendezvous, "  ").await.is_err());
        assert_eq!(transport.request_count(), 0);
    }
}
