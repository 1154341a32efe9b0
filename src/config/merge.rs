//! Configuration merge semantics for `extends` inheritance.
//!
//! Sequences append with insertion-order deduplication, parent entries
//! first. Flags OR. Tri-state fields take the child when present. Port
//! fields take the child when non-zero. The merged result never carries an
//! `extends` reference.

use crate::config::schema::{
    CommandConfig, FenceConfig, FilesystemConfig, NetworkConfig, SshConfig,
};

/// Maximum depth of an `extends` chain.
pub const MAX_INHERITANCE_DEPTH: usize = 10;

/// Merge a child document over its resolved parent.
pub fn merge(parent: &FenceConfig, child: &FenceConfig) -> FenceConfig {
    FenceConfig {
        extends: None,
        network: merge_network(&parent.network, &child.network),
        filesystem: merge_filesystem(&parent.filesystem, &child.filesystem),
        command: merge_command(&parent.command, &child.command),
        ssh: merge_ssh(&parent.ssh, &child.ssh),
        allow_pty: parent.allow_pty || child.allow_pty,
    }
}

fn merge_network(parent: &NetworkConfig, child: &NetworkConfig) -> NetworkConfig {
    NetworkConfig {
        allowed_domains: append_dedup(&parent.allowed_domains, &child.allowed_domains),
        denied_domains: append_dedup(&parent.denied_domains, &child.denied_domains),
        allow_unix_sockets: append_dedup(&parent.allow_unix_sockets, &child.allow_unix_sockets),
        allow_all_unix_sockets: parent.allow_all_unix_sockets || child.allow_all_unix_sockets,
        allow_local_binding: parent.allow_local_binding || child.allow_local_binding,
        allow_local_outbound: child.allow_local_outbound.or(parent.allow_local_outbound),
        http_proxy_port: pick_port(parent.http_proxy_port, child.http_proxy_port),
        socks_proxy_port: pick_port(parent.socks_proxy_port, child.socks_proxy_port),
    }
}

fn merge_filesystem(parent: &FilesystemConfig, child: &FilesystemConfig) -> FilesystemConfig {
    FilesystemConfig {
        deny_read: append_dedup(&parent.deny_read, &child.deny_read),
        allow_write: append_dedup(&parent.allow_write, &child.allow_write),
        deny_write: append_dedup(&parent.deny_write, &child.deny_write),
        allow_git_config: parent.allow_git_config || child.allow_git_config,
    }
}

fn merge_command(parent: &CommandConfig, child: &CommandConfig) -> CommandConfig {
    CommandConfig {
        deny: append_dedup(&parent.deny, &child.deny),
        allow: append_dedup(&parent.allow, &child.allow),
        use_defaults: child.use_defaults.or(parent.use_defaults),
    }
}

fn merge_ssh(parent: &SshConfig, child: &SshConfig) -> SshConfig {
    SshConfig {
        allowed_hosts: append_dedup(&parent.allowed_hosts, &child.allowed_hosts),
        denied_hosts: append_dedup(&parent.denied_hosts, &child.denied_hosts),
        allowed_commands: append_dedup(&parent.allowed_commands, &child.allowed_commands),
        denied_commands: append_dedup(&parent.denied_commands, &child.denied_commands),
        allow_all_commands: parent.allow_all_commands || child.allow_all_commands,
        inherit_deny: parent.inherit_deny || child.inherit_deny,
    }
}

fn append_dedup(parent: &[String], child: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(parent.len() + child.len());
    for entry in parent.iter().chain(child) {
        if !out.contains(entry) {
            out.push(entry.clone());
        }
    }
    out
}

fn pick_port(parent: u16, child: u16) -> u16 {
    if child != 0 {
        child
    } else {
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_domains(allowed: &[&str]) -> FenceConfig {
        FenceConfig {
            network: NetworkConfig {
                allowed_domains: allowed.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn sequences_append_parent_first_and_dedup() {
        let parent = with_domains(&["a.com", "b.com"]);
        let child = with_domains(&["b.com", "c.com"]);
        let merged = merge(&parent, &child);
        assert_eq!(
            merged.network.allowed_domains,
            vec!["a.com", "b.com", "c.com"]
        );
    }

    #[test]
    fn merge_is_idempotent_on_itself() {
        let config = FenceConfig {
            network: NetworkConfig {
                allowed_domains: vec!["a.com".to_string()],
                allow_local_binding: true,
                http_proxy_port: 3128,
                ..Default::default()
            },
            allow_pty: true,
            ..Default::default()
        };
        let merged = merge(&config, &config);
        assert_eq!(merged, config);
    }

    #[test]
    fn flags_or_together() {
        let parent = FenceConfig {
            filesystem: FilesystemConfig {
                allow_git_config: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let child = FenceConfig {
            allow_pty: true,
            ..Default::default()
        };
        let merged = merge(&parent, &child);
        assert!(merged.filesystem.allow_git_config);
        assert!(merged.allow_pty);
    }

    #[test]
    fn tristate_prefers_child_when_present() {
        let parent = FenceConfig {
            command: CommandConfig {
                use_defaults: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let child = FenceConfig {
            command: CommandConfig {
                use_defaults: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(merge(&parent, &child).command.use_defaults, Some(false));

        let absent_child = FenceConfig::default();
        assert_eq!(
            merge(&parent, &absent_child).command.use_defaults,
            Some(true)
        );
    }

    #[test]
    fn ports_prefer_nonzero_child() {
        let parent = FenceConfig {
            network: NetworkConfig {
                http_proxy_port: 3128,
                ..Default::default()
            },
            ..Default::default()
        };
        let child = FenceConfig::default();
        assert_eq!(merge(&parent, &child).network.http_proxy_port, 3128);

        let child = FenceConfig {
            network: NetworkConfig {
                http_proxy_port: 8080,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(merge(&parent, &child).network.http_proxy_port, 8080);
    }

    #[test]
    fn extends_is_cleared() {
        let parent = FenceConfig::default();
        let child = FenceConfig {
            extends: Some("code".to_string()),
            ..Default::default()
        };
        assert_eq!(merge(&parent, &child).extends, None);
    }
}
