//! SSH invocation policy.
//!
//! An `ssh` fragment is parsed into destination host and remote command.
//! The host is checked against the configured host lists; the remote
//! command, if any, is split like a local command line and each subcommand
//! is checked against the SSH command lists (and, with `inheritDeny`, the
//! global deny lists as well).

use crate::config::{matches_host, FenceConfig};
use crate::error::{BlockOrigin, PolicyBlock};
use crate::policy::command::{matches_prefix, DEFAULT_DENY};
use crate::policy::shell::{expand_fragments, normalize};
use crate::utils::shell::{basename, tokenize};

/// SSH flags that consume the following argument.
const OPTION_TAKING_FLAGS: &[&str] = &[
    "-p", "-l", "-i", "-o", "-F", "-J", "-W", "-b", "-c", "-D", "-E", "-e", "-I", "-L", "-m",
    "-O", "-Q", "-R", "-S", "-w",
];

/// A parsed `ssh` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshInvocation {
    /// Destination host with any `user@` prefix removed.
    pub host: String,
    /// Remote command, rejoined with single spaces; empty for interactive.
    pub remote_command: String,
}

/// Parse the fragment as an ssh invocation, or None when the head token is
/// not `ssh` or no host is present.
pub fn parse_ssh(fragment: &str) -> Option<SshInvocation> {
    let tokens = tokenize(fragment);
    let first = tokens.first()?;
    if basename(first) != "ssh" {
        return None;
    }

    let mut i = 1;
    while i < tokens.len() {
        let token = &tokens[i];
        if OPTION_TAKING_FLAGS.contains(&token.as_str()) {
            i += 2;
            continue;
        }
        if token.starts_with('-') {
            i += 1;
            continue;
        }
        let host = match token.split_once('@') {
            Some((_, host)) => host.to_string(),
            None => token.clone(),
        };
        let remote_command = tokens[i + 1..].join(" ");
        return Some(SshInvocation {
            host,
            remote_command,
        });
    }
    None
}

/// Apply SSH policy to a fragment. Fragments that are not ssh invocations
/// pass. With no host policy configured, ssh is unrestricted.
pub fn check_ssh(config: &FenceConfig, fragment: &str) -> Result<(), PolicyBlock> {
    let invocation = match parse_ssh(fragment) {
        Some(invocation) => invocation,
        None => return Ok(()),
    };

    let ssh = &config.ssh;
    if !ssh.has_host_policy() {
        return Ok(());
    }

    if let Some(pattern) = ssh
        .denied_hosts
        .iter()
        .find(|pattern| matches_host(&invocation.host, pattern))
    {
        return Err(PolicyBlock {
            command: normalize(fragment),
            prefix: pattern.clone(),
            origin: BlockOrigin::SshHost,
        });
    }

    if !ssh.allowed_hosts.is_empty()
        && !ssh
            .allowed_hosts
            .iter()
            .any(|pattern| matches_host(&invocation.host, pattern))
    {
        return Err(PolicyBlock {
            command: normalize(fragment),
            prefix: invocation.host.clone(),
            origin: BlockOrigin::SshHost,
        });
    }

    if invocation.remote_command.is_empty() {
        return Ok(());
    }

    for subcommand in expand_fragments(&invocation.remote_command) {
        check_remote_command(config, &subcommand)?;
    }
    Ok(())
}

fn check_remote_command(config: &FenceConfig, subcommand: &str) -> Result<(), PolicyBlock> {
    let cmd = normalize(subcommand);
    if cmd.is_empty() {
        return Ok(());
    }
    let ssh = &config.ssh;

    if ssh.inherit_deny {
        if let Some(prefix) = config
            .command
            .deny
            .iter()
            .find(|prefix| matches_prefix(&cmd, prefix))
        {
            return Err(PolicyBlock {
                command: cmd,
                prefix: prefix.clone(),
                origin: BlockOrigin::Deny,
            });
        }
        if config.command.defaults_enabled() {
            if let Some(prefix) = DEFAULT_DENY
                .iter()
                .find(|prefix| matches_prefix(&cmd, prefix))
            {
                return Err(PolicyBlock {
                    command: cmd,
                    prefix: prefix.to_string(),
                    origin: BlockOrigin::Default,
                });
            }
        }
    }

    if let Some(prefix) = ssh
        .denied_commands
        .iter()
        .find(|prefix| matches_prefix(&cmd, prefix))
    {
        return Err(PolicyBlock {
            command: cmd,
            prefix: prefix.clone(),
            origin: BlockOrigin::SshCommand,
        });
    }

    if ssh.allow_all_commands {
        return Ok(());
    }

    if !ssh
        .allowed_commands
        .iter()
        .any(|prefix| matches_prefix(&cmd, prefix))
    {
        let prefix = cmd.clone();
        return Err(PolicyBlock {
            command: cmd,
            prefix,
            origin: BlockOrigin::SshCommand,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandConfig, SshConfig};
    use crate::policy::command::check_command;

    fn allowlist_config() -> FenceConfig {
        FenceConfig {
            ssh: SshConfig {
                allowed_hosts: vec!["*.example.com".to_string()],
                allowed_commands: vec![
                    "ls".to_string(),
                    "cat".to_string(),
                    "tail -f".to_string(),
                ],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn parses_host_and_remote_command() {
        let invocation = parse_ssh("ssh srv.example.com ls -la").unwrap();
        assert_eq!(invocation.host, "srv.example.com");
        assert_eq!(invocation.remote_command, "ls -la");
    }

    #[test]
    fn parses_user_prefix_and_flags() {
        let invocation =
            parse_ssh("ssh -p 2222 -o StrictHostKeyChecking=no deploy@srv.example.com uptime")
                .unwrap();
        assert_eq!(invocation.host, "srv.example.com");
        assert_eq!(invocation.remote_command, "uptime");
    }

    #[test]
    fn flag_argument_is_not_the_host() {
        let invocation = parse_ssh("ssh -i key.pem -l admin srv.example.com").unwrap();
        assert_eq!(invocation.host, "srv.example.com");
        assert_eq!(invocation.remote_command, "");
    }

    #[test]
    fn non_ssh_fragments_pass() {
        assert_eq!(parse_ssh("sshpass -p x ssh host"), None);
        assert_eq!(parse_ssh("ls -la"), None);
    }

    #[test]
    fn quoted_remote_command_is_split_and_checked() {
        let config = allowlist_config();
        assert!(check_command(&config, "ssh srv.example.com ls -la").is_ok());
        assert!(check_command(&config, "ssh srv.example.com rm -rf /tmp").is_err());
        assert!(check_command(&config, "ssh srv.example.com \"ls && rm -rf /\"").is_err());
        assert!(check_command(&config, "ssh other.com ls").is_err());
        assert!(check_command(&config, "ssh srv.example.com").is_ok());
        assert!(check_command(&config, "ssh srv.example.com tail -f /var/log/syslog").is_ok());
    }

    #[test]
    fn no_host_policy_means_unrestricted() {
        let config = FenceConfig::default();
        assert!(check_command(&config, "ssh anywhere.net rm -rf /").is_ok());
    }

    #[test]
    fn denied_hosts_win_over_allowed() {
        let config = FenceConfig {
            ssh: SshConfig {
                allowed_hosts: vec!["*".to_string()],
                denied_hosts: vec!["*.internal.example.com".to_string()],
                allow_all_commands: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(check_command(&config, "ssh build.example.com make").is_ok());
        let err = check_command(&config, "ssh db.internal.example.com ls").unwrap_err();
        assert_eq!(err.origin, BlockOrigin::SshHost);
    }

    #[test]
    fn allow_all_commands_switches_to_denylist_mode() {
        let config = FenceConfig {
            ssh: SshConfig {
                allowed_hosts: vec!["*.example.com".to_string()],
                denied_commands: vec!["rm".to_string()],
                allow_all_commands: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(check_command(&config, "ssh srv.example.com make test").is_ok());
        let err = check_command(&config, "ssh srv.example.com rm -rf /tmp").unwrap_err();
        assert_eq!(err.origin, BlockOrigin::SshCommand);
    }

    #[test]
    fn inherit_deny_applies_global_lists_remotely() {
        let config = FenceConfig {
            command: CommandConfig {
                deny: vec!["git push".to_string()],
                ..Default::default()
            },
            ssh: SshConfig {
                allowed_hosts: vec!["*.example.com".to_string()],
                allow_all_commands: true,
                inherit_deny: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = check_command(&config, "ssh srv.example.com git push").unwrap_err();
        assert_eq!(err.origin, BlockOrigin::Deny);
        let err = check_command(&config, "ssh srv.example.com shutdown").unwrap_err();
        assert_eq!(err.origin, BlockOrigin::Default);
    }
}
