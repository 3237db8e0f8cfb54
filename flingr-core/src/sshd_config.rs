//! `sshd_config` rendering.
//!
//! The service config is always rendered from a template, never from a
//! previously written file, so applying new values twice replaces rather
//! than stacks the managed directives.

use std::fmt;
use std::net::Ipv4Addr;

/// Template used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = "\
# Flingr managed sshd_config
Port 22
#ListenAddress 0.0.0.0
PubkeyAuthentication yes
PasswordAuthentication yes
PermitEmptyPasswords no
AuthorizedKeysFile .ssh/authorized_keys
Subsystem sftp sftp-server.exe
#ChrootDirectory none
#ForceCommand internal-sftp
";

/// A directive managed by Flingr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// `ListenAddress <ip>`
    ListenAddress,
    /// `ChrootDirectory <dir>`
    ChrootDirectory,
    /// `ForceCommand internal-sftp -d <dir>`
    ForceCommand,
}

impl Directive {
    /// Every managed directive, in append order.
    pub const ALL: [Directive; 3] = [
        Directive::ListenAddress,
        Directive::ChrootDirectory,
        Directive::ForceCommand,
    ];

    /// Check whether a template line carries this directive.
    ///
    /// Commented-out directives match too, so a disabled example in the
    /// template is replaced in place instead of duplicated.
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Directive::ListenAddress => line.contains("ListenAddress"),
            Directive::ChrootDirectory => line.contains("ChrootDirectory"),
            Directive::ForceCommand => {
                line.contains("ForceCommand") && line.contains("internal-sftp")
            }
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Directive::ListenAddress => "ListenAddress",
            Directive::ChrootDirectory => "ChrootDirectory",
            Directive::ForceCommand => "ForceCommand",
        };
        f.write_str(name)
    }
}

/// Values to apply. `None` leaves the directive as the template has it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigValues {
    /// Address sshd listens on.
    pub listen_address: Option<Ipv4Addr>,
    /// Directory served over SFTP.
    pub root_directory: Option<String>,
}

impl ConfigValues {
    fn line_for(&self, directive: Directive) -> Option<String> {
        match directive {
            Directive::ListenAddress => self
                .listen_address
                .map(|ip| format!("ListenAddress {ip}")),
            Directive::ChrootDirectory => self
                .root_directory
                .as_ref()
                .map(|dir| format!("ChrootDirectory {dir}")),
            Directive::ForceCommand => self
                .root_directory
                .as_ref()
                .map(|dir| format!("ForceCommand internal-sftp -d {dir}")),
        }
    }
}

/// Rendered config text plus what happened to each directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    /// Full config text, newline terminated.
    pub text: String,
    /// Directives replaced in place.
    pub replaced: Vec<Directive>,
    /// Directives appended after the template.
    pub appended: Vec<Directive>,
}

/// Render `template` with `values` applied.
///
/// Each directive is handled independently: every template line that
/// carries it is rewritten. A directive the template lacks is appended at
/// the end, but only if it has a value.
pub fn render(template: &str, values: &ConfigValues) -> RenderedConfig {
    let mut text = String::with_capacity(template.len() + 128);
    let mut found = Vec::new();
    let mut replaced = Vec::new();

    for line in template.lines() {
        let mut out = line.to_string();
        if let Some(directive) = Directive::ALL.into_iter().find(|d| d.matches(line)) {
            if !found.contains(&directive) {
                found.push(directive);
            }
            if let Some(value) = values.line_for(directive) {
                out = value;
                if !replaced.contains(&directive) {
                    replaced.push(directive);
                }
            }
        }
        text.push_str(&out);
        text.push('\n');
    }

    let mut appended = Vec::new();
    for directive in Directive::ALL {
        if found.contains(&directive) {
            continue;
        }
        if let Some(value) = values.line_for(directive) {
            text.push_str(&value);
            text.push('\n');
            appended.push(directive);
        }
    }

    RenderedConfig {
        text,
        replaced,
        appended,
    }
}
