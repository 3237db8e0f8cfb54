//! Host service manager commands and their textual output contract.
//!
//! Commands are argument-vector templates. Placeholders are substituted
//! per argument, so values containing spaces never need shell quoting:
//!
//! | placeholder | value                          |
//! |-------------|--------------------------------|
//! | `{service}` | service name (`sshd`)          |
//! | `{package}` | capability package pattern/name |
//! | `{binary}`  | daemon executable path         |
//! | `{config}`  | rendered config file path      |

use serde::{Deserialize, Serialize};

/// Marker printed by the service manager after a successful start.
pub const STARTED_MARKER: &str = "started successfully";

/// Marker printed by the service manager after a successful stop.
pub const STOPPED_MARKER: &str = "stopped successfully";

/// Values substituted into command templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders<'a> {
    /// `{service}`
    pub service: &'a str,
    /// `{package}`
    pub package: &'a str,
    /// `{binary}`
    pub binary: &'a str,
    /// `{config}`
    pub config: &'a str,
}

/// One command line as program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    /// Build a template from its words.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(words.into_iter().map(Into::into).collect())
    }

    /// Substitute placeholders and split into `(program, args)`.
    ///
    /// Returns `None` for an empty template.
    pub fn render(&self, values: &Placeholders<'_>) -> Option<(String, Vec<String>)> {
        let mut words = self.0.iter().map(|word| {
            word.replace("{service}", values.service)
                .replace("{package}", values.package)
                .replace("{binary}", values.binary)
                .replace("{config}", values.config)
        });
        let program = words.next()?;
        Some((program, words.collect()))
    }
}

/// Command templates for every service manager operation.
///
/// Defaults drive the Windows service manager (`net`, `sc`) and the
/// PowerShell capability cmdlets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceCommands {
    /// Start the service.
    pub start: CommandTemplate,
    /// Stop the service.
    pub stop: CommandTemplate,
    /// Print the service definition (must include `BINARY_PATH_NAME`).
    pub query: CommandTemplate,
    /// Point the service at the rendered config.
    pub reconfigure: CommandTemplate,
    /// List the daemon capability and its install state.
    pub capability_query: CommandTemplate,
    /// Install the daemon capability.
    pub capability_install: CommandTemplate,
}

impl Default for ServiceCommands {
    fn default() -> Self {
        Self {
            start: CommandTemplate::new(["net", "start", "{service}"]),
            stop: CommandTemplate::new(["net", "stop", "{service}"]),
            query: CommandTemplate::new(["sc", "qc", "{service}"]),
            reconfigure: CommandTemplate::new([
                "sc",
                "config",
                "{service}",
                "binpath=",
                "{binary} -f \"{config}\"",
            ]),
            capability_query: CommandTemplate::new([
                "powershell",
                "-command",
                "Get-WindowsCapability -Online | ? Name -like '{package}'",
            ]),
            capability_install: CommandTemplate::new([
                "powershell",
                "-command",
                "Add-WindowsCapability -Online -Name {package}",
            ]),
        }
    }
}

/// Check for the start confirmation.
pub fn confirms_start(output: &str) -> bool {
    output.contains(STARTED_MARKER)
}

/// Check for the stop confirmation.
pub fn confirms_stop(output: &str) -> bool {
    output.contains(STOPPED_MARKER)
}

/// Find the daemon executable in a service definition.
///
/// Picks the word of the `BINARY_PATH_NAME` line containing `marker`
/// (e.g. `OpenSSH\sshd.exe`).
pub fn parse_binary_path(output: &str, marker: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("BINARY_PATH_NAME"))
        .flat_map(str::split_whitespace)
        .filter(|word| word.contains(marker))
        .last()
        .map(|word| word.trim_matches('"').to_string())
}

/// Install state of the daemon capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityStatus {
    /// Exact package name reported, e.g. `OpenSSH.Server~~~~0.0.1.0`.
    pub package: Option<String>,
    /// Whether the capability reports `State : Installed`.
    pub installed: bool,
    /// Whether the capability reports `NotPresent`.
    pub not_present: bool,
}

/// Parse capability query output.
///
/// `prefix` is the package name stem (`OpenSSH.Server`).
pub fn parse_capability(output: &str, prefix: &str) -> CapabilityStatus {
    let package = output
        .lines()
        .flat_map(str::split_whitespace)
        .filter(|word| word.contains(prefix))
        .last()
        .map(str::to_string);
    let installed = output.lines().any(|line| {
        let words: Vec<&str> = line.split_whitespace().collect();
        words == ["State", ":", "Installed"]
    });
    let not_present = output.contains("NotPresent");

    CapabilityStatus {
        package,
        installed,
        not_present,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SC_QC_OUTPUT: &str = "\
[SC] QueryServiceConfig SUCCESS

SERVICE_NAME: sshd
        TYPE               : 10  WIN32_OWN_PROCESS
        START_TYPE         : 3   DEMAND_START
        ERROR_CONTROL      : 1   NORMAL
        BINARY_PATH_NAME   : C:\\WINDOWS\\System32\\OpenSSH\\sshd.exe -f \"C:\\flingr\\sshd_config_flingr\"
        LOAD_ORDER_GROUP   :
        TAG                : 0
        DISPLAY_NAME       : OpenSSH SSH Server
";

    const CAPABILITY_NOT_PRESENT: &str = "\
Name         : OpenSSH.Server~~~~0.0.1.0
State        : NotPresent
";

    const CAPABILITY_INSTALLED: &str = "\
Name  : OpenSSH.Server~~~~0.0.1.0
State : Installed
";

    fn placeholders() -> Placeholders<'static> {
        Placeholders {
            service: "sshd",
            package: "OpenSSH.Server~~~~0.0.1.0",
            binary: "C:\\OpenSSH\\sshd.exe",
            config: "C:\\flingr\\sshd_config_flingr",
        }
    }

    #[test]
    fn renders_default_commands() {
        let commands = ServiceCommands::default();
        let (program, args) = commands.start.render(&placeholders()).unwrap();
        assert_eq!(program, "net");
        assert_eq!(args, vec!["start", "sshd"]);

        let (program, args) = commands.reconfigure.render(&placeholders()).unwrap();
        assert_eq!(program, "sc");
        assert_eq!(
            args,
            vec![
                "config",
                "sshd",
                "binpath=",
                "C:\\OpenSSH\\sshd.exe -f \"C:\\flingr\\sshd_config_flingr\""
            ]
        );

        let (_, args) = commands.capability_install.render(&placeholders()).unwrap();
        assert_eq!(
            args[1],
            "Add-WindowsCapability -Online -Name OpenSSH.Server~~~~0.0.1.0"
        );
    }

    #[test]
    fn empty_template_renders_nothing() {
        assert!(CommandTemplate::new(Vec::<String>::new())
            .render(&placeholders())
            .is_none());
    }

    #[test]
    fn start_and_stop_need_exact_marker() {
        assert!(confirms_start("The OpenSSH SSH Server service was started successfully.\n"));
        assert!(!confirms_start("The requested service has already been started.\n"));
        assert!(confirms_stop("The OpenSSH SSH Server service was stopped successfully.\n"));
        assert!(!confirms_stop("System error 5 has occurred.\nAccess is denied.\n"));
    }

    #[test]
    fn finds_binary_path() {
        assert_eq!(
            parse_binary_path(SC_QC_OUTPUT, "OpenSSH\\sshd.exe").as_deref(),
            Some("C:\\WINDOWS\\System32\\OpenSSH\\sshd.exe")
        );
        assert_eq!(
            parse_binary_path("[SC] OpenService FAILED 1060:", "OpenSSH\\sshd.exe"),
            None
        );
    }

    #[test]
    fn parses_capability_state() {
        let missing = parse_capability(CAPABILITY_NOT_PRESENT, "OpenSSH.Server");
        assert_eq!(missing.package.as_deref(), Some("OpenSSH.Server~~~~0.0.1.0"));
        assert!(missing.not_present);
        assert!(!missing.installed);

        let present = parse_capability(CAPABILITY_INSTALLED, "OpenSSH.Server");
        assert!(present.installed);
        assert!(!present.not_present);

        let nothing = parse_capability("", "OpenSSH.Server");
        assert_eq!(nothing.package, None);
        assert!(!nothing.installed);
    }

    #[test]
    fn commands_deserialize_with_defaults() {
        let commands: ServiceCommands =
            serde_json::from_str(r#"{"start":["systemctl","start","{service}"]}"#).unwrap();
        assert_eq!(
            commands.start,
            CommandTemplate::new(["systemctl", "start", "{service}"])
        );
        assert_eq!(commands.stop, ServiceCommands::default().stop);
    }
}
