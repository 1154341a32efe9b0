//! Error types for fence.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FenceError>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum FenceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Blocked(#[from] PolicyBlock),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sandbox execution failed: {0}")]
    ExecutionFailed(String),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid domain pattern '{pattern}': {reason}")]
    InvalidDomainPattern { pattern: String, reason: String },

    #[error("invalid host pattern '{pattern}': {reason}")]
    InvalidHostPattern { pattern: String, reason: String },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("inheritance cycle detected at '{0}'")]
    InheritanceCycle(String),

    #[error("inheritance chain exceeds {max} levels at '{reference}'")]
    InheritanceTooDeep { reference: String, max: usize },
}

/// A command rejected by policy. The child is never spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("command blocked by {origin} policy: '{command}' matches '{prefix}'")]
pub struct PolicyBlock {
    /// The offending subcommand, normalized.
    pub command: String,
    /// The prefix (or host pattern) that matched.
    pub prefix: String,
    /// Which rule set produced the block.
    pub origin: BlockOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    /// Matched a user `command.deny` entry.
    Deny,
    /// Matched the built-in default deny list.
    Default,
    /// SSH host not permitted.
    SshHost,
    /// SSH remote command not permitted.
    SshCommand,
}

impl std::fmt::Display for BlockOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BlockOrigin::Deny => "deny-list",
            BlockOrigin::Default => "default deny-list",
            BlockOrigin::SshHost => "ssh host",
            BlockOrigin::SshCommand => "ssh command",
        };
        f.write_str(s)
    }
}
