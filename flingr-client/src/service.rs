//! Local file-serving daemon (OpenSSH `sshd`) control.
//!
//! Everything goes through the host's service manager via templated command
//! lines; success is judged from the tool's textual output.

use flingr_core::service::{self as svc, CapabilityStatus};
use flingr_core::sshd_config::{self, ConfigValues, Directive};
use flingr_core::{CommandTemplate, Placeholders, ServiceCommands};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::command::CommandRunner;

/// Service control errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Writing the rendered config failed.
    #[error("failed to write {path}: {source}")]
    WriteConfig {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Root directory is not valid UTF-8.
    #[error("root directory is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

/// Where and how the daemon is managed.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Service name known to the service manager.
    pub name: String,
    /// Directory the rendered config is written to.
    pub working_dir: PathBuf,
    /// File name of the rendered config.
    pub config_file: String,
    /// Capability package pattern used when nothing is installed.
    pub package_pattern: String,
    /// Stem identifying the capability in query output.
    pub package_prefix: String,
    /// Word identifying the daemon in `BINARY_PATH_NAME`.
    pub binary_marker: String,
    /// Executable used when the service definition cannot be read.
    pub default_executable: PathBuf,
    /// Command templates.
    pub commands: ServiceCommands,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "sshd".to_string(),
            working_dir: PathBuf::from("."),
            config_file: "sshd_config_flingr".to_string(),
            package_pattern: "OpenSSH.Server*".to_string(),
            package_prefix: "OpenSSH.Server".to_string(),
            binary_marker: r"OpenSSH\sshd.exe".to_string(),
            default_executable: PathBuf::from(r"C:\WINDOWS\System32\OpenSSH\sshd.exe"),
            commands: ServiceCommands::default(),
        }
    }
}

impl ServiceSettings {
    /// Full path of the rendered config.
    pub fn config_path(&self) -> PathBuf {
        self.working_dir.join(&self.config_file)
    }
}

/// What [`EndpointServiceController::apply_config`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigResult {
    /// File written.
    pub path: PathBuf,
    /// Directives rewritten in place.
    pub replaced: Vec<Directive>,
    /// Directives appended.
    pub appended: Vec<Directive>,
}

/// Configures, starts, stops, locates and installs the daemon.
pub struct EndpointServiceController {
    runner: Arc<dyn CommandRunner>,
    settings: ServiceSettings,
}

impl EndpointServiceController {
    /// Create a controller.
    pub fn new(runner: Arc<dyn CommandRunner>, settings: ServiceSettings) -> Self {
        Self { runner, settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Render `template` with the given values and overwrite the config file.
    pub async fn apply_config(
        &self,
        listen_address: Option<Ipv4Addr>,
        root_directory: Option<&Path>,
        template: &str,
    ) -> Result<ConfigResult, ServiceError> {
        let root_directory = root_directory
            .map(|dir| {
                dir.to_str()
                    .map(str::to_string)
                    .ok_or_else(|| ServiceError::NonUtf8Path(dir.to_path_buf()))
            })
            .transpose()?;
        let values = ConfigValues {
            listen_address,
            root_directory,
        };
        let rendered = sshd_config::render(template, &values);

        let path = self.settings.config_path();
        tokio::fs::write(&path, rendered.text.as_bytes())
            .await
            .map_err(|source| ServiceError::WriteConfig {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            replaced = rendered.replaced.len(),
            appended = rendered.appended.len(),
            "service config written"
        );
        Ok(ConfigResult {
            path,
            replaced: rendered.replaced,
            appended: rendered.appended,
        })
    }

    /// Start the daemon. True only on the manager's confirmation.
    pub async fn start(&self) -> bool {
        let started = self
            .run(&self.settings.commands.start, &self.placeholders(""))
            .await
            .map(|out| svc::confirms_start(&out))
            .unwrap_or(false);
        if started {
            tracing::info!(service = %self.settings.name, "service started");
        } else {
            tracing::warn!(service = %self.settings.name, "service did not confirm start");
        }
        started
    }

    /// Stop the daemon. True only on the manager's confirmation.
    pub async fn stop(&self) -> bool {
        let stopped = self
            .run(&self.settings.commands.stop, &self.placeholders(""))
            .await
            .map(|out| svc::confirms_stop(&out))
            .unwrap_or(false);
        if stopped {
            tracing::info!(service = %self.settings.name, "service stopped");
        } else {
            tracing::warn!(service = %self.settings.name, "service did not confirm stop");
        }
        stopped
    }

    /// Find the daemon executable from the service definition.
    pub async fn locate_executable(&self) -> Option<PathBuf> {
        let output = self
            .run(&self.settings.commands.query, &self.placeholders(""))
            .await?;
        let path = svc::parse_binary_path(&output, &self.settings.binary_marker).map(PathBuf::from);
        match &path {
            Some(path) => tracing::info!(path = %path.display(), "daemon executable located"),
            None => tracing::debug!("daemon executable not found in service definition"),
        }
        path
    }

    /// Install the daemon capability if it is missing.
    ///
    /// Succeeds only when a final query reports it installed. Does not check
    /// the network; callers do.
    pub async fn install(&self) -> bool {
        let status = self.query_capability(&self.settings.package_pattern).await;
        if status.not_present {
            let package = status
                .package
                .clone()
                .unwrap_or_else(|| self.settings.package_pattern.clone());
            self.install_capability(&package).await;
        }

        let status = self.query_capability(&self.settings.package_pattern).await;
        if status.installed {
            tracing::info!("daemon capability installed");
        } else {
            tracing::warn!("daemon capability not installed");
        }
        status.installed
    }

    /// Reconfigure the service to run `executable` with the rendered config.
    ///
    /// True when the manager ran the command with a zero exit status.
    pub async fn point_service_at_config(&self, executable: &Path) -> bool {
        let binary = executable.display().to_string();
        let config = self.settings.config_path().display().to_string();
        let Some((program, args)) = self
            .settings
            .commands
            .reconfigure
            .render(&self.placeholders_with_binary(&binary, &config))
        else {
            return false;
        };

        match self.runner.run(&program, &args).await {
            Ok(output) => {
                let ok = output.status.map(|code| code == 0).unwrap_or(true);
                if ok {
                    tracing::info!(executable = %binary, %config, "service pointed at config");
                } else {
                    tracing::warn!(status = ?output.status, "service reconfigure failed");
                }
                ok
            }
            Err(e) => {
                tracing::error!(error = %e, "service manager could not be run");
                false
            }
        }
    }

    async fn install_capability(&self, package: &str) {
        tracing::info!(%package, "installing daemon capability");
        let install = &self.settings.commands.capability_install;
        let Some((program, args)) = install.render(&self.placeholders(package)) else {
            tracing::warn!("capability install command is empty");
            return;
        };

        match self.runner.run(&program, &args).await {
            Ok(output) if output.status.map(|code| code == 0).unwrap_or(true) => {
                tracing::debug!(output = %output.text(), "capability install finished");
            }
            Ok(output) => {
                tracing::warn!(
                    status = ?output.status,
                    output = %output.text(),
                    "capability install failed"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "capability install could not be run");
            }
        }
    }

    async fn query_capability(&self, package: &str) -> CapabilityStatus {
        let query = &self.settings.commands.capability_query;
        let output = self
            .run(query, &self.placeholders(package))
            .await
            .unwrap_or_default();
        svc::parse_capability(&output, &self.settings.package_prefix)
    }

    fn placeholders<'a>(&'a self, package: &'a str) -> Placeholders<'a> {
        Placeholders {
            service: &self.settings.name,
            package,
            ..Placeholders::default()
        }
    }

    fn placeholders_with_binary<'a>(&'a self, binary: &'a str, config: &'a str) -> Placeholders<'a> {
        Placeholders {
            service: &self.settings.name,
            package: "",
            binary,
            config,
        }
    }

    async fn run(&self, template: &CommandTemplate, values: &Placeholders<'_>) -> Option<String> {
        let (program, args) = template.render(values)?;
        match self.runner.run(&program, &args).await {
            Ok(output) => Some(output.text()),
            Err(e) => {
                tracing::error!(error = %e, "service manager could not be run");
                None
            }
        }
    }
}

impl std::fmt::Debug for EndpointServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointServiceController")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockRunner;
    use flingr_core::DEFAULT_TEMPLATE;

    const TEMPLATE: &str = "\
Port 22
#ListenAddress 0.0.0.0
Subsystem sftp sftp-server.exe
ChrootDirectory C:\\old
";

    fn controller(runner: &MockRunner, dir: &Path) -> EndpointServiceController {
        let settings = ServiceSettings {
            working_dir: dir.to_path_buf(),
            ..ServiceSettings::default()
        };
        EndpointServiceController::new(Arc::new(runner.clone()), settings)
    }

    #[tokio::test]
    async fn apply_config_writes_rendered_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("share");
        let runner = MockRunner::new();
        let service = controller(&runner, dir.path());

        let result = service
            .apply_config(Some(Ipv4Addr::new(192, 168, 1, 10)), Some(&root), TEMPLATE)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&result.path).unwrap();
        assert_eq!(result.path, dir.path().join("sshd_config_flingr"));
        assert!(written.contains("ListenAddress 192.168.1.10\n"));
        assert!(written.contains(&format!("ChrootDirectory {}\n", root.display())));
        assert!(written.contains(&format!("ForceCommand internal-sftp -d {}\n", root.display())));
        assert!(!written.contains("C:\\old"));
        assert_eq!(result.appended, vec![Directive::ForceCommand]);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn applying_twice_does_not_stack() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let service = controller(&runner, dir.path());
        let one = dir.path().join("one");
        let two = dir.path().join("two");
        let ip = Some(Ipv4Addr::new(192, 168, 1, 10));

        let first = service
            .apply_config(ip, Some(&one), DEFAULT_TEMPLATE)
            .await
            .unwrap();
        let once = std::fs::read_to_string(&first.path).unwrap();
        assert!(once.contains(&one.display().to_string()));

        service
            .apply_config(ip, Some(&two), DEFAULT_TEMPLATE)
            .await
            .unwrap();
        let twice = std::fs::read_to_string(&first.path).unwrap();

        assert!(!twice.contains(&one.display().to_string()));
        assert_eq!(
            twice.matches(&format!("ChrootDirectory {}", two.display())).count(),
            1
        );
        assert_eq!(
            twice
                .matches(&format!("ForceCommand internal-sftp -d {}", two.display()))
                .count(),
            1
        );
        assert_eq!(twice.matches("ListenAddress").count(), 1);
        assert_eq!(once.lines().count(), twice.lines().count());
    }

    #[tokio::test]
    async fn apply_config_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let service = controller(&runner, &dir.path().join("missing"));

        let result = service.apply_config(None, None, TEMPLATE).await;
        assert!(matches!(result, Err(ServiceError::WriteConfig { .. })));
    }

    #[tokio::test]
    async fn start_and_stop_need_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let service = controller(&runner, dir.path());

        runner.respond_once("net start sshd", "The OpenSSH SSH Server service was started successfully.");
        assert!(service.start().await);
        runner.respond_once("net start sshd", "System error 1058 has occurred.");
        assert!(!service.start().await);

        runner.respond_once("net stop sshd", "The OpenSSH SSH Server service was stopped successfully.");
        assert!(service.stop().await);
        assert!(!service.stop().await);
    }

    #[tokio::test]
    async fn locates_executable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        runner.respond(
            "sc qc sshd",
            "SERVICE_NAME: sshd\n        BINARY_PATH_NAME   : C:\\WINDOWS\\System32\\OpenSSH\\sshd.exe\n",
        );
        let service = controller(&runner, dir.path());

        assert_eq!(
            service.locate_executable().await,
            Some(PathBuf::from(r"C:\WINDOWS\System32\OpenSSH\sshd.exe"))
        );
    }

    #[tokio::test]
    async fn locate_without_service_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        runner.respond(
            "sc qc sshd",
            "[SC] OpenService FAILED 1060:\n\nThe specified service does not exist as an installed service.\n",
        );
        assert_eq!(controller(&runner, dir.path()).locate_executable().await, None);
    }

    #[tokio::test]
    async fn install_runs_for_missing_capability() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        runner.respond_once(
            "Get-WindowsCapability",
            "Name  : OpenSSH.Server~~~~0.0.1.0\nState : NotPresent\n",
        );
        runner.respond_once(
            "Get-WindowsCapability",
            "Name  : OpenSSH.Server~~~~0.0.1.0\nState : Installed\n",
        );
        let service = controller(&runner, dir.path());

        assert!(service.install().await);
        assert_eq!(
            runner.calls_matching("Add-WindowsCapability"),
            vec!["powershell -command Add-WindowsCapability -Online -Name OpenSSH.Server~~~~0.0.1.0"]
        );
    }

    #[tokio::test]
    async fn install_spawn_failure_is_reported_as_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        runner.respond(
            "Get-WindowsCapability",
            "Name  : OpenSSH.Server~~~~0.0.1.0\nState : NotPresent\n",
        );
        runner.fail_spawn("Add-WindowsCapability", "powershell not found");
        let service = controller(&runner, dir.path());

        assert!(!service.install().await);
        assert_eq!(runner.calls_matching("Add-WindowsCapability").len(), 1);
        assert_eq!(runner.calls_matching("Get-WindowsCapability").len(), 2);
    }

    #[tokio::test]
    async fn install_skips_when_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        runner.respond(
            "Get-WindowsCapability",
            "Name  : OpenSSH.Server~~~~0.0.1.0\nState : Installed\n",
        );
        let service = controller(&runner, dir.path());

        assert!(service.install().await);
        assert!(runner.calls_matching("Add-WindowsCapability").is_empty());
    }

    #[tokio::test]
    async fn install_fails_without_final_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        runner.respond(
            "Get-WindowsCapability",
            "Name  : OpenSSH.Server~~~~0.0.1.0\nState : NotPresent\n",
        );
        assert!(!controller(&runner, dir.path()).install().await);
    }

    #[tokio::test]
    async fn points_service_at_config() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let service = controller(&runner, dir.path());
        let exe = PathBuf::from(r"C:\WINDOWS\System32\OpenSSH\sshd.exe");

        assert!(service.point_service_at_config(&exe).await);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("sc config sshd binpath= C:\\WINDOWS\\System32\\OpenSSH\\sshd.exe -f \""));
        assert!(calls[0].ends_with("sshd_config_flingr\""));
    }
}
