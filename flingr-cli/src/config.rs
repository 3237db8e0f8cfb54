//! Configuration loading for flingr.
//!
//! Configuration is loaded from a TOML file (default: `flingr.toml`). Every
//! section and field is optional.

use flingr_client::{RendezvousConfig, ServiceSettings, DEFAULT_UPNPC};
use flingr_core::ServiceCommands;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for flingr.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendezvous store location.
    pub rendezvous: RendezvousSection,
    /// Signing credentials.
    pub credentials: CredentialsSection,
    /// Port mapping tool.
    pub nat: NatSection,
    /// File-serving daemon.
    pub service: ServiceSection,
    /// Connect behaviour.
    pub connection: ConnectionSection,
}

/// Rendezvous store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendezvousSection {
    /// API host, no scheme.
    pub host: String,
    /// Deployment stage prefix (e.g. `/test`).
    pub stage: String,
    /// Resource path.
    pub path: String,
    /// Table name.
    pub table: String,
    /// Signing region.
    pub region: String,
    /// Signing service name.
    pub service: String,
    /// HTTP request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

/// Credentials; when either is missing the AWS environment variables are used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
}

/// Port mapping configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatSection {
    /// `upnpc` executable (default: `upnpc` on `PATH`).
    pub upnpc: String,
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Service name (default: `sshd`).
    pub name: String,
    /// Rendered config file, relative to the working directory.
    pub config_file: PathBuf,
    /// sshd_config template; the built-in one is used when absent.
    pub template: Option<PathBuf>,
    /// Executable used when the service definition cannot be read.
    pub default_executable: PathBuf,
    /// Word identifying the daemon in the service definition.
    pub binary_marker: String,
    /// Service manager command templates.
    pub commands: ServiceCommands,
}

/// Connect configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Publish the endpoint to the rendezvous store (default: true).
    pub register: bool,
    /// Point the service at the rendered config (default: true).
    pub auto_configure: bool,
    /// Refresh interval in milliseconds (default: 180100).
    pub refresh_interval_ms: u64,
    /// LAN address; setting it selects manual mode.
    pub local_address: Option<String>,
    /// Port the daemon listens on (default: 22).
    pub local_port: u32,
    /// Gateway port; random when absent.
    pub external_port: Option<u32>,
    /// Directory served over SFTP.
    pub root_directory: Option<PathBuf>,
}

impl Default for RendezvousSection {
    fn default() -> Self {
        Self {
            host: "20d3ektd5h.execute-api.us-east-1.amazonaws.com".to_string(),
            stage: "/test".to_string(),
            path: "/FlingrRegistration".to_string(),
            table: "flingrMap".to_string(),
            region: "us-east-1".to_string(),
            service: "execute-api".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for NatSection {
    fn default() -> Self {
        Self {
            upnpc: DEFAULT_UPNPC.to_string(),
        }
    }
}

impl Default for ServiceSection {
    fn default() -> Self {
        let defaults = ServiceSettings::default();
        Self {
            name: defaults.name,
            config_file: PathBuf::from(defaults.config_file),
            template: None,
            default_executable: defaults.default_executable,
            binary_marker: defaults.binary_marker,
            commands: defaults.commands,
        }
    }
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            register: true,
            auto_configure: true,
            refresh_interval_ms: 180_100,
            local_address: None,
            local_port: 22,
            external_port: None,
            root_directory: None,
        }
    }
}

impl RendezvousSection {
    /// Store location for the client.
    pub fn store(&self) -> RendezvousConfig {
        RendezvousConfig {
            host: self.host.clone(),
            stage: self.stage.clone(),
            path: self.path.clone(),
            table: self.table.clone(),
        }
    }

    /// HTTP request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServiceSection {
    /// Service settings writing the config under `working_dir`.
    pub fn settings(&self, working_dir: &Path) -> ServiceSettings {
        ServiceSettings {
            name: self.name.clone(),
            working_dir: working_dir.to_path_buf(),
            config_file: self.config_file.to_string_lossy().into_owned(),
            default_executable: self.default_executable.clone(),
            binary_marker: self.binary_marker.clone(),
            commands: self.commands.clone(),
            ..ServiceSettings::default()
        }
    }
}

impl ConnectionSection {
    /// Refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a
    /// duration is zero.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or crash a connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rendezvous.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rendezvous.timeout_secs",
                reason: "must be greater than zero",
            });
        }
        if self.connection.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connection.refresh_interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A field holds a value that cannot be used.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use flingr_core::CommandTemplate;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.rendezvous.path, "/FlingrRegistration");
        assert_eq!(config.rendezvous.store().canonical_uri(), "/test/FlingrRegistration");
        assert_eq!(config.nat.upnpc, "upnpc");
        assert_eq!(config.service.name, "sshd");
        assert_eq!(config.connection.refresh_interval(), Duration::from_millis(180_100));
        assert!(config.connection.register);
        assert!(config.credentials.access_key_id.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.rendezvous.table, "flingrMap");
        assert_eq!(config.connection.local_port, 22);
        assert_eq!(config.service.commands, ServiceCommands::default());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[rendezvous]
host = "abc.execute-api.eu-west-1.amazonaws.com"
stage = "/prod"
region = "eu-west-1"
timeout_secs = 5

[credentials]
access_key_id = "AKIDEXAMPLE"
secret_access_key = "secret"

[nat]
upnpc = "/usr/local/bin/upnpc"

[service]
name = "ssh"
config_file = "sshd_config"

[service.commands]
start = ["systemctl", "start", "{service}"]
stop = ["systemctl", "stop", "{service}"]

[connection]
register = false
refresh_interval_ms = 60000
local_address = "192.168.1.10"
external_port = 51413
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rendezvous.stage, "/prod");
        assert_eq!(config.rendezvous.path, "/FlingrRegistration");
        assert_eq!(config.rendezvous.timeout(), Duration::from_secs(5));
        assert_eq!(config.credentials.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert_eq!(config.nat.upnpc, "/usr/local/bin/upnpc");
        assert_eq!(
            config.service.commands.start,
            CommandTemplate::new(["systemctl", "start", "{service}"])
        );
        // Unlisted commands keep their defaults.
        assert_eq!(
            config.service.commands.query,
            ServiceCommands::default().query
        );
        assert!(!config.connection.register);
        assert_eq!(config.connection.local_address.as_deref(), Some("192.168.1.10"));
        assert_eq!(config.connection.external_port, Some(51413));
        assert_eq!(config.connection.local_port, 22);
    }

    #[test]
    fn service_settings_use_working_dir() {
        let config = Config::default();
        let settings = config.service.settings(Path::new("/srv/flingr"));
        assert_eq!(
            settings.config_path(),
            PathBuf::from("/srv/flingr/sshd_config_flingr")
        );
        assert_eq!(settings.package_pattern, "OpenSSH.Server*");
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[nat]\nupnpc = \"upnpc-static\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.nat.upnpc, "upnpc-static");
    }

    #[test]
    fn from_file_reports_errors() {
        let missing = Config::from_file(Path::new("/nonexistent/flingr.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nlocal_port = \"twenty-two\"").unwrap();
        let invalid = Config::from_file(file.path());
        assert!(matches!(invalid, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nrefresh_interval_ms = 0").unwrap();
        let result = Config::from_file(file.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "connection.refresh_interval_ms",
                ..
            })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rendezvous]\ntimeout_secs = 0").unwrap();
        let result = Config::from_file(file.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "rendezvous.timeout_secs",
                ..
            })
        ));

        assert!(Config::default().validate().is_ok());
    }
}
