//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::utils::shell::join_args;

fn parse_port(s: &str) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(0) => Err("port must be between 1 and 65535".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("invalid port '{s}'")),
    }
}

/// fence - confine a command's network, filesystem, and subprocesses
#[derive(Parser, Debug)]
#[command(name = "fence")]
#[command(about = "Run a command inside a per-invocation sandbox")]
#[command(version, disable_version_flag = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Report policy violations observed while the command runs
    #[arg(short = 'm', long = "monitor")]
    pub monitor: bool,

    /// Path to a settings file (default: ~/.fence.json)
    #[arg(short = 's', long = "settings")]
    pub settings: Option<PathBuf>,

    /// Use a built-in policy template
    #[arg(short = 't', long = "template")]
    pub template: Option<String>,

    /// List built-in policy templates and exit
    #[arg(long = "list-templates")]
    pub list_templates: bool,

    /// Expose a sandboxed port to the host (repeatable)
    #[arg(short = 'p', long = "port", value_parser = parse_port)]
    pub ports: Vec<u16>,

    /// Print detected Linux confinement features and exit
    #[arg(long = "linux-features")]
    pub linux_features: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Internal: apply the Landlock ruleset and exec the command
    #[arg(long = "landlock-apply", hide = true)]
    pub landlock_apply: bool,

    /// Run a command string through the shell
    #[arg(short = 'c', value_name = "COMMAND")]
    pub command: Option<String>,

    /// Command and arguments to run
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// The command to confine: `-c` wins, otherwise the positional words
    /// joined with quoting.
    pub fn get_command(&self) -> Option<String> {
        if let Some(ref command) = self.command {
            Some(command.clone())
        } else if !self.args.is_empty() {
            Some(join_args(&self.args))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_become_a_quoted_command() {
        let cli = Cli::parse_from(["fence", "echo", "hello world"]);
        assert_eq!(cli.get_command().unwrap(), "echo 'hello world'");
    }

    #[test]
    fn dash_c_takes_priority() {
        let cli = Cli::parse_from(["fence", "-c", "ls | wc -l"]);
        assert_eq!(cli.get_command().unwrap(), "ls | wc -l");
    }

    #[test]
    fn command_flags_are_not_parsed_as_fence_flags() {
        let cli = Cli::parse_from(["fence", "ls", "-la"]);
        assert!(!cli.debug);
        assert_eq!(cli.get_command().unwrap(), "ls -la");
    }

    #[test]
    fn flags_before_command_are_interspersed() {
        let cli = Cli::parse_from(["fence", "-d", "-p", "8000", "-p", "9000", "ls"]);
        assert!(cli.debug);
        assert_eq!(cli.ports, vec![8000, 9000]);
        assert_eq!(cli.get_command().unwrap(), "ls");
    }

    #[test]
    fn double_dash_terminates_flag_parsing() {
        let cli = Cli::parse_from(["fence", "--", "-d"]);
        assert!(!cli.debug);
        assert_eq!(cli.get_command().unwrap(), "-d");
    }

    #[test]
    fn port_zero_is_rejected() {
        assert!(Cli::try_parse_from(["fence", "-p", "0", "ls"]).is_err());
        assert!(Cli::try_parse_from(["fence", "-p", "70000", "ls"]).is_err());
    }

    #[test]
    fn landlock_apply_mode_collects_trailing_command() {
        let cli = Cli::parse_from(["fence", "--landlock-apply", "--", "/bin/sh", "-c", "ls"]);
        assert!(cli.landlock_apply);
        assert_eq!(cli.args, vec!["/bin/sh", "-c", "ls"]);
    }

    #[test]
    fn no_command_yields_none() {
        let cli = Cli::parse_from(["fence", "--list-templates"]);
        assert!(cli.list_templates);
        assert_eq!(cli.get_command(), None);
    }
}
