//! Typed configuration schema.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FenceError};

/// Network restriction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Domains allowed for outbound access. The literal `*` allows all.
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Domains explicitly denied, checked before the allow list.
    #[serde(default)]
    pub denied_domains: Vec<String>,

    /// Absolute Unix socket paths the child may use.
    #[serde(default)]
    pub allow_unix_sockets: Vec<String>,

    /// Allow all Unix sockets.
    #[serde(default)]
    pub allow_all_unix_sockets: bool,

    /// Allow binding to localhost.
    #[serde(default)]
    pub allow_local_binding: bool,

    /// Allow outbound connections to localhost. Absent inherits from
    /// `allow_local_binding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_local_outbound: Option<bool>,

    /// Fixed HTTP proxy port, 0 for ephemeral.
    #[serde(default)]
    pub http_proxy_port: u16,

    /// Fixed SOCKS proxy port, 0 for ephemeral.
    #[serde(default)]
    pub socks_proxy_port: u16,
}

impl NetworkConfig {
    /// Resolved `allowLocalOutbound` tri-state.
    pub fn local_outbound(&self) -> bool {
        self.allow_local_outbound.unwrap_or(self.allow_local_binding)
    }

    /// Whether the literal `*` entry disables domain filtering.
    pub fn allows_all_domains(&self) -> bool {
        self.allowed_domains.iter().any(|d| d == "*")
    }
}

/// Filesystem restriction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemConfig {
    /// Paths or glob patterns hidden from the child entirely.
    #[serde(default)]
    pub deny_read: Vec<String>,

    /// Paths or glob patterns the child may write.
    #[serde(default)]
    pub allow_write: Vec<String>,

    /// Paths or glob patterns forced read-only, overriding allow_write.
    #[serde(default)]
    pub deny_write: Vec<String>,

    /// Permit writes to .git/config.
    #[serde(default)]
    pub allow_git_config: bool,
}

/// Command-string restriction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    /// Command prefixes to block.
    #[serde(default)]
    pub deny: Vec<String>,

    /// Command prefixes exempt from deny and default lists.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Apply the built-in default deny list. Absent means true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_defaults: Option<bool>,
}

impl CommandConfig {
    pub fn defaults_enabled(&self) -> bool {
        self.use_defaults.unwrap_or(true)
    }
}

/// SSH invocation restriction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    /// Host patterns permitted as SSH destinations (`*` wildcards allowed).
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Host patterns blocked as SSH destinations.
    #[serde(default)]
    pub denied_hosts: Vec<String>,

    /// Remote command prefixes permitted on allowed hosts.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Remote command prefixes blocked on allowed hosts.
    #[serde(default)]
    pub denied_commands: Vec<String>,

    /// Switch from allow-list to deny-list mode for remote commands.
    #[serde(default)]
    pub allow_all_commands: bool,

    /// Also apply global `command.deny` and the default list to remote
    /// commands.
    #[serde(default)]
    pub inherit_deny: bool,
}

impl SshConfig {
    /// Whether any host policy is configured at all.
    pub fn has_host_policy(&self) -> bool {
        !self.allowed_hosts.is_empty() || !self.denied_hosts.is_empty()
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FenceConfig {
    /// Parent document: a built-in template name (no slash, no leading dot)
    /// or a file path resolved against the referring document's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub filesystem: FilesystemConfig,

    #[serde(default)]
    pub command: CommandConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Allow pseudo-terminal allocation (macOS profile rule).
    #[serde(default)]
    pub allow_pty: bool,
}

/// Files that must never become writable, wherever they appear.
pub const DANGEROUS_FILES: &[&str] = &[
    ".gitconfig",
    ".gitmodules",
    ".bashrc",
    ".bash_profile",
    ".zshrc",
    ".zprofile",
    ".profile",
    ".ripgreprc",
    ".mcp.json",
];

/// Directories that must never become writable.
pub const DANGEROUS_DIRECTORIES: &[&str] = &[
    ".vscode",
    ".idea",
    ".claude/commands",
    ".claude/agents",
];

/// Always protected regardless of configuration.
pub const GIT_HOOKS_DIR: &str = ".git/hooks";
/// Protected unless `allowGitConfig` is set.
pub const GIT_CONFIG_FILE: &str = ".git/config";

impl FenceConfig {
    /// Validate every list entry in the document.
    pub fn validate(&self) -> Result<(), FenceError> {
        for domain in &self.network.allowed_domains {
            // `*` is a legal allow entry meaning "all domains"; the pattern
            // validator itself rejects wildcard-only patterns.
            if domain == "*" {
                continue;
            }
            validate_domain(domain)?;
        }
        for domain in &self.network.denied_domains {
            validate_domain(domain)?;
        }
        for socket in &self.network.allow_unix_sockets {
            if !socket.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "unix socket path must be absolute: '{}'",
                    socket
                ))
                .into());
            }
        }
        for host in self
            .ssh
            .allowed_hosts
            .iter()
            .chain(&self.ssh.denied_hosts)
        {
            validate_host_pattern(host)?;
        }
        for entry in self
            .command
            .deny
            .iter()
            .chain(&self.command.allow)
            .chain(&self.ssh.allowed_commands)
            .chain(&self.ssh.denied_commands)
            .chain(&self.filesystem.deny_read)
            .chain(&self.filesystem.allow_write)
            .chain(&self.filesystem.deny_write)
        {
            if entry.trim().is_empty() {
                return Err(
                    ConfigError::ValidationError("list entries must not be empty".to_string())
                        .into(),
                );
            }
        }
        Ok(())
    }
}

/// Validate a domain pattern: `localhost`, a plain dot-bearing hostname, or
/// `*.<base>` where base contains at least one dot and no empty components.
pub fn validate_domain(pattern: &str) -> Result<(), FenceError> {
    let fail = |reason: &str| -> FenceError {
        ConfigError::InvalidDomainPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    if pattern.is_empty() {
        return Err(fail("pattern must not be empty"));
    }
    if pattern.contains("://") || pattern.contains('/') {
        return Err(fail("pattern must not include a protocol or path"));
    }
    if pattern.contains(':') {
        return Err(fail("pattern must not include a port"));
    }
    if pattern == "localhost" {
        return Ok(());
    }
    if pattern == "*" {
        return Err(fail("wildcard-only patterns are not allowed"));
    }

    let base = match pattern.strip_prefix("*.") {
        Some(base) => base,
        None => pattern,
    };
    if base.contains('*') {
        return Err(fail("wildcard is only allowed as a leading '*.'"));
    }
    if !base.contains('.') {
        return Err(fail("hostname must contain a dot"));
    }
    if base.split('.').any(|label| label.is_empty()) {
        return Err(fail("hostname must not have empty labels"));
    }
    for ch in base.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '-' && ch != '_' {
            return Err(fail("hostname contains an invalid character"));
        }
    }
    Ok(())
}

/// Validate an SSH host pattern: `*` anywhere, no protocol/path/port/user.
/// IPv6 forms are recognized by having at least two colons.
pub fn validate_host_pattern(pattern: &str) -> Result<(), FenceError> {
    let fail = |reason: &str| -> FenceError {
        ConfigError::InvalidHostPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    if pattern.is_empty() {
        return Err(fail("pattern must not be empty"));
    }
    if pattern.contains("://") || pattern.contains('/') {
        return Err(fail("pattern must not include a protocol or path"));
    }
    if pattern.contains('@') {
        return Err(fail("pattern must not include a user"));
    }
    let colons = pattern.matches(':').count();
    if colons == 1 {
        return Err(fail("pattern must not include a port"));
    }
    // Two or more colons: an IPv6 literal, accepted as written.
    if colons >= 2 {
        return Ok(());
    }
    for ch in pattern.chars() {
        if !ch.is_ascii_alphanumeric() && !matches!(ch, '.' | '-' | '_' | '*') {
            return Err(fail("pattern contains an invalid character"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validator_accepts_sane_patterns() {
        for ok in ["localhost", "example.com", "api.github.com", "*.example.com", "*.api.example.com"] {
            assert!(validate_domain(ok).is_ok(), "{ok} should validate");
        }
    }

    #[test]
    fn domain_validator_rejects_boundary_cases() {
        for bad in [
            "https://x.com",
            "x.com/p",
            "x.com:443",
            "*.com",
            "x.*.com",
            "x.com.*",
            ".x.com",
            "x.com.",
            "x",
            "*.",
            "*",
            "",
        ] {
            assert!(validate_domain(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn host_validator_accepts_ipv6_and_globs() {
        for ok in ["::1", "2001:db8::1", "*", "*.example.com", "bastion*", "srv*internal"] {
            assert!(validate_host_pattern(ok).is_ok(), "{ok} should validate");
        }
    }

    #[test]
    fn host_validator_rejects_boundary_cases() {
        for bad in ["ssh://x", "x/p", "x:22", "u@x", ""] {
            assert!(validate_host_pattern(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn wildcard_all_is_legal_in_allowed_domains_only() {
        let config: FenceConfig = serde_json::from_str(
            r#"{"network": {"allowedDomains": ["*"]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert!(config.network.allows_all_domains());

        let config: FenceConfig = serde_json::from_str(
            r#"{"network": {"deniedDomains": ["*"]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn local_outbound_inherits_binding() {
        let mut network = NetworkConfig::default();
        assert!(!network.local_outbound());
        network.allow_local_binding = true;
        assert!(network.local_outbound());
        network.allow_local_outbound = Some(false);
        assert!(!network.local_outbound());
    }

    #[test]
    fn use_defaults_absent_means_true() {
        let command = CommandConfig::default();
        assert!(command.defaults_enabled());
        let command = CommandConfig {
            use_defaults: Some(false),
            ..Default::default()
        };
        assert!(!command.defaults_enabled());
    }

    #[test]
    fn empty_list_entries_rejected() {
        let config: FenceConfig =
            serde_json::from_str(r#"{"command": {"deny": [" "]}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn camel_case_round_trip() {
        let json = r#"{
            "network": {"allowedDomains": ["github.com"], "httpProxyPort": 3128},
            "filesystem": {"allowWrite": ["/workspace"], "allowGitConfig": true},
            "command": {"useDefaults": false},
            "ssh": {"allowedHosts": ["*.example.com"], "allowAllCommands": true},
            "allowPty": true
        }"#;
        let config: FenceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.network.http_proxy_port, 3128);
        assert!(config.filesystem.allow_git_config);
        assert_eq!(config.command.use_defaults, Some(false));
        assert!(config.ssh.allow_all_commands);
        assert!(config.allow_pty);

        let text = serde_json::to_string(&config).unwrap();
        let back: FenceConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
