//! Command allow/deny decisions.

use crate::config::FenceConfig;
use crate::error::{BlockOrigin, PolicyBlock};
use crate::policy::shell::{expand_fragments, normalize};
use crate::policy::ssh;

/// Built-in deny list applied when `useDefaults` is on: system control,
/// kernel module and kexec tooling, filesystem formatters, privileged
/// container escapes, and namespace tools.
pub const DEFAULT_DENY: &[&str] = &[
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
    "systemctl poweroff",
    "systemctl reboot",
    "systemctl halt",
    "insmod",
    "rmmod",
    "modprobe",
    "kexec",
    "mkfs",
    "mkfs.ext2",
    "mkfs.ext3",
    "mkfs.ext4",
    "mkfs.xfs",
    "mkfs.btrfs",
    "mkfs.vfat",
    "mkfs.fat",
    "mkfs.ntfs",
    "fdisk",
    "parted",
    "dd if=",
    "docker run --privileged",
    "docker run -v /:/",
    "chroot",
    "unshare",
    "nsenter",
];

/// Check whether `command` normalized equals `prefix` normalized or starts
/// with it followed by a space. `git pushall` does not match `git push`.
pub fn matches_prefix(command: &str, prefix: &str) -> bool {
    let command = normalize(command);
    let prefix = normalize(prefix);
    if prefix.is_empty() {
        return false;
    }
    command == prefix || command.starts_with(&format!("{} ", prefix))
}

/// Check a full command string against policy. Every fragment produced by
/// splitting and nested-shell expansion must pass.
pub fn check_command(config: &FenceConfig, command: &str) -> Result<(), PolicyBlock> {
    for fragment in expand_fragments(command) {
        check_fragment(config, &fragment)?;
    }
    Ok(())
}

fn check_fragment(config: &FenceConfig, fragment: &str) -> Result<(), PolicyBlock> {
    let cmd = normalize(fragment);
    if cmd.is_empty() {
        return Ok(());
    }

    let allowed = config
        .command
        .allow
        .iter()
        .any(|prefix| matches_prefix(&cmd, prefix));

    if !allowed {
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

    // The SSH check runs on every fragment, allowed or not: an allow-listed
    // `ssh` prefix must not bypass host and remote-command policy.
    ssh::check_ssh(config, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;

    fn config_with(deny: &[&str], allow: &[&str]) -> FenceConfig {
        FenceConfig {
            command: CommandConfig {
                deny: deny.iter().map(|s| s.to_string()).collect(),
                allow: allow.iter().map(|s| s.to_string()).collect(),
                use_defaults: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefix_match_requires_word_boundary() {
        assert!(matches_prefix("git push", "git push"));
        assert!(matches_prefix("git push origin main", "git push"));
        assert!(!matches_prefix("git pushall", "git push"));
        assert!(!matches_prefix("rmdir x", "rm"));
    }

    #[test]
    fn prefix_match_normalizes_head_path() {
        assert!(matches_prefix("/usr/bin/git push", "git push"));
        assert!(matches_prefix("git push", "/usr/bin/git push"));
    }

    #[test]
    fn defaults_block_dangerous_commands() {
        let config = FenceConfig::default();
        for blocked in [
            "shutdown",
            "shutdown -h now",
            "mkfs.ext4 /dev/sda1",
            "insmod m.ko",
            "dd if= /dev/sda",
            "docker run --privileged image",
            "nsenter -t 1 -m",
        ] {
            assert!(check_command(&config, blocked).is_err(), "{blocked}");
        }
        for fine in ["rmdir empty", "shutdown-like", "ls", "echo shutdown"] {
            assert!(check_command(&config, fine).is_ok(), "{fine}");
        }
    }

    #[test]
    fn default_block_carries_origin() {
        let config = FenceConfig::default();
        let err = check_command(&config, "shutdown -h now").unwrap_err();
        assert_eq!(err.origin, BlockOrigin::Default);
        assert_eq!(err.prefix, "shutdown");
        assert_eq!(err.command, "shutdown -h now");
    }

    #[test]
    fn chained_bypasses_are_blocked() {
        let config = config_with(&["git push", "rm -rf"], &[]);
        for blocked in [
            "ls && rm -rf /",
            "cat f; shutdown",
            "bash -c \"git push\"",
            "bash -lc \"git push\"",
            "/usr/bin/git push",
            "true || git push",
            "echo hi | git push",
        ] {
            assert!(check_command(&config, blocked).is_err(), "{blocked}");
        }
    }

    #[test]
    fn allow_overrides_deny_for_longer_prefix() {
        let config = config_with(&["git push"], &["git push origin docs"]);
        let err = check_command(&config, "git push origin main").unwrap_err();
        assert_eq!(err.origin, BlockOrigin::Deny);
        assert!(check_command(&config, "git push origin docs --force").is_ok());
    }

    #[test]
    fn use_defaults_off_disables_builtin_list() {
        let mut config = FenceConfig::default();
        config.command.use_defaults = Some(false);
        assert!(check_command(&config, "shutdown").is_ok());
        // User deny still applies.
        config.command.deny = vec!["shutdown".to_string()];
        assert!(check_command(&config, "shutdown").is_err());
    }

    #[test]
    fn allow_exempts_from_defaults() {
        let config = config_with(&[], &["unshare -r"]);
        assert!(check_command(&config, "unshare -r whoami").is_ok());
        assert!(check_command(&config, "unshare -m").is_err());
    }
}
