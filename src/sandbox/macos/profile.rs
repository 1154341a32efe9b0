//! Sandbox profile generation for sandbox-exec.
//!
//! The profile denies by default, tagging every denial with a per-session
//! marker so the unified-log stream can be filtered to this invocation,
//! then allows the essential rights a command-line process needs, and
//! finally derives the network and filesystem sections from policy.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{
    FenceConfig, FilesystemConfig, NetworkConfig, DANGEROUS_DIRECTORIES, DANGEROUS_FILES,
    GIT_CONFIG_FILE, GIT_HOOKS_DIR,
};
use crate::sandbox::macos::glob::glob_to_regex;
use crate::utils::path::{ancestor_dirs, contains_glob_chars, normalize_path};

/// Suffix that makes denial lines filterable in the unified log.
pub const LOG_TAG_SUFFIX: &str = "_SBX";

/// Build the per-invocation log tag:
/// `CMD64_<base64(command, first 100 chars)>_END_<9 hex>_SBX`.
pub fn generate_log_tag(command: &str) -> String {
    use base64::Engine;
    use rand::Rng;

    let truncated: String = command.chars().take(100).collect();
    let encoded = base64::engine::general_purpose::STANDARD.encode(truncated);
    let nonce: u64 = rand::thread_rng().gen::<u64>() & 0xF_FFFF_FFFF;
    format!("CMD64_{encoded}_END_{nonce:09x}{LOG_TAG_SUFFIX}")
}

/// Recover the original (truncated) command from a log tag.
pub fn decode_command_from_tag(tag: &str) -> Option<String> {
    use base64::Engine;

    let rest = tag.strip_prefix("CMD64_")?;
    let end = rest.find("_END_")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&rest[..end])
        .ok()?;
    String::from_utf8(decoded).ok()
}

/// Emit the complete profile document.
pub fn generate_profile(
    config: &FenceConfig,
    http_proxy_port: u16,
    socks_proxy_port: u16,
    log_tag: &str,
) -> String {
    let mut p = String::new();

    p.push_str("(version 1)\n");
    p.push_str(&format!(
        "(deny default (with message \"{}\"))\n\n",
        escape(log_tag)
    ));

    essential_rights(&mut p, config);
    network_section(&mut p, &config.network, http_proxy_port, socks_proxy_port);
    file_read_section(&mut p, &config.filesystem);
    file_write_section(&mut p, &config.filesystem);

    p
}

/// Rights every confined command-line process needs.
fn essential_rights(p: &mut String, config: &FenceConfig) {
    p.push_str("; process\n");
    p.push_str("(allow process-exec*)\n");
    p.push_str("(allow process-fork)\n");
    p.push_str("(allow process-info* (target same-sandbox))\n");
    p.push_str("(allow signal (target same-sandbox))\n");
    p.push_str("(allow mach-task-name (target same-sandbox))\n\n");

    p.push_str("; preferences and services\n");
    p.push_str("(allow user-preference-read)\n");
    p.push_str("(allow mach-lookup (global-name\n");
    for service in [
        "com.apple.system.opendirectoryd.libinfo",
        "com.apple.system.notification_center",
        "com.apple.system.logger",
        "com.apple.logd",
        "com.apple.SystemConfiguration.configd",
        "com.apple.FSEvents",
        "com.apple.coreservices.launchservicesd",
        "com.apple.dnssd.service",
        "com.apple.trustd.agent",
        "com.apple.securityd.xpc",
    ] {
        p.push_str(&format!("    \"{service}\"\n"));
    }
    p.push_str("))\n\n");

    p.push_str("; ipc\n");
    p.push_str("(allow ipc-posix-shm*)\n");
    p.push_str("(allow ipc-posix-sem*)\n");
    p.push_str("(allow distributed-notification-post)\n\n");

    p.push_str("; iokit\n");
    p.push_str("(allow iokit-open\n");
    p.push_str("    (iokit-user-client-class \"RootDomainUserClient\")\n");
    p.push_str("    (iokit-user-client-class \"IOSurfaceRootUserClient\"))\n\n");

    p.push_str("; kernel interfaces\n");
    p.push_str("(allow system-socket (socket-domain AF_SYSTEM))\n");
    p.push_str("(allow sysctl-read (sysctl-name\n");
    for name in [
        "hw.activecpu",
        "hw.ncpu",
        "hw.byteorder",
        "hw.memsize",
        "hw.pagesize",
        "hw.cputype",
        "hw.cpusubtype",
        "hw.machine",
        "hw.model",
        "kern.hostname",
        "kern.osrelease",
        "kern.ostype",
        "kern.osversion",
        "kern.version",
        "kern.boottime",
        "kern.maxfilesperproc",
        "vm.footprint_suspend",
    ] {
        p.push_str(&format!("    \"{name}\"\n"));
    }
    p.push_str("))\n");
    p.push_str("(allow sysctl-write (sysctl-name \"kern.tcsm_enable\"))\n\n");

    p.push_str("; devices\n");
    p.push_str("(allow file-read* file-write-data file-ioctl\n");
    p.push_str("    (literal \"/dev/null\")\n");
    p.push_str("    (literal \"/dev/zero\")\n");
    p.push_str("    (literal \"/dev/random\")\n");
    p.push_str("    (literal \"/dev/urandom\")\n");
    p.push_str("    (literal \"/dev/tty\"))\n\n");

    if config.allow_pty {
        p.push_str("; pty\n");
        p.push_str("(allow pseudo-tty)\n");
        p.push_str("(allow file-read* file-write* file-ioctl (regex #\"^/dev/ttys[0-9]+$\"))\n");
        p.push_str("(allow file-read* file-write* file-ioctl (literal \"/dev/ptmx\"))\n\n");
    }
}

fn network_section(
    p: &mut String,
    network: &NetworkConfig,
    http_proxy_port: u16,
    socks_proxy_port: u16,
) {
    p.push_str("; network\n");
    if network.allows_all_domains() {
        p.push_str("(allow network*)\n\n");
        return;
    }

    if network.allow_local_binding {
        p.push_str("(allow network-bind network-inbound (local ip \"localhost:*\"))\n");
    }
    if network.local_outbound() {
        p.push_str("(allow network-outbound (remote ip \"localhost:*\"))\n");
    }

    if network.allow_all_unix_sockets {
        p.push_str("(allow network* (subpath \"/\"))\n");
    } else {
        for socket in &network.allow_unix_sockets {
            let normalized = normalize_path(socket);
            p.push_str(&format!(
                "(allow network* (literal \"{}\"))\n",
                escape(&normalized)
            ));
        }
    }

    for port in [http_proxy_port, socks_proxy_port] {
        p.push_str(&format!(
            "(allow network-outbound (remote ip \"localhost:{port}\"))\n"
        ));
        p.push_str(&format!(
            "(allow network-bind network-inbound (local ip \"localhost:{port}\"))\n"
        ));
    }
    p.push('\n');
}

fn file_read_section(p: &mut String, fs: &FilesystemConfig) {
    p.push_str("; file reads: open by default, hide denyRead\n");
    p.push_str("(allow file-read*)\n");
    for path in &fs.deny_read {
        let normalized = normalize_path(path);
        if contains_glob_chars(&normalized) {
            p.push_str(&format!(
                "(deny file-read* (regex #\"{}\"))\n",
                glob_to_regex(&normalized)
            ));
        } else {
            p.push_str(&format!(
                "(deny file-read* (subpath \"{}\"))\n",
                escape(&normalized)
            ));
        }
    }
    p.push('\n');
}

fn file_write_section(p: &mut String, fs: &FilesystemConfig) {
    p.push_str("; file writes: deny by default, open allowWrite\n");

    for dir in tmp_write_roots() {
        p.push_str(&format!(
            "(allow file-write* (subpath \"{}\"))\n",
            escape(&dir.display().to_string())
        ));
    }

    for path in &fs.allow_write {
        let normalized = normalize_path(path);
        if contains_glob_chars(&normalized) {
            p.push_str(&format!(
                "(allow file-write* (regex #\"{}\"))\n",
                glob_to_regex(&normalized)
            ));
        } else {
            p.push_str(&format!(
                "(allow file-write* (subpath \"{}\"))\n",
                escape(&normalized)
            ));
        }
    }

    p.push_str("\n; denied writes win over allowWrite\n");
    let mut unlink_protect: Vec<PathBuf> = Vec::new();
    for path in &fs.deny_write {
        let normalized = normalize_path(path);
        if contains_glob_chars(&normalized) {
            p.push_str(&format!(
                "(deny file-write* (regex #\"{}\"))\n",
                glob_to_regex(&normalized)
            ));
        } else {
            p.push_str(&format!(
                "(deny file-write* (subpath \"{}\"))\n",
                escape(&normalized)
            ));
            unlink_protect.push(PathBuf::from(normalized));
        }
    }

    mandatory_deny_rules(p, fs, &mut unlink_protect);

    // Rename/move protection: a denied path stays denied even through its
    // ancestors.
    p.push_str("\n; rename protection for denied paths\n");
    let mut emitted: HashSet<PathBuf> = HashSet::new();
    for path in &unlink_protect {
        for target in std::iter::once(path.clone()).chain(ancestor_dirs(path)) {
            if emitted.insert(target.clone()) {
                p.push_str(&format!(
                    "(deny file-write-unlink (literal \"{}\"))\n",
                    escape(&target.display().to_string())
                ));
            }
        }
    }
}

fn mandatory_deny_rules(p: &mut String, fs: &FilesystemConfig, unlink_protect: &mut Vec<PathBuf>) {
    p.push_str("\n; mandatory deny set\n");
    for file in DANGEROUS_FILES {
        let pattern = format!("**/{file}");
        p.push_str(&format!(
            "(deny file-write* (regex #\"{}\"))\n",
            glob_to_regex(&pattern)
        ));
    }
    for dir in DANGEROUS_DIRECTORIES {
        for pattern in [format!("**/{dir}"), format!("**/{dir}/**")] {
            p.push_str(&format!(
                "(deny file-write* (regex #\"{}\"))\n",
                glob_to_regex(&pattern)
            ));
        }
    }
    for pattern in [
        format!("**/{GIT_HOOKS_DIR}"),
        format!("**/{GIT_HOOKS_DIR}/**"),
    ] {
        p.push_str(&format!(
            "(deny file-write* (regex #\"{}\"))\n",
            glob_to_regex(&pattern)
        ));
    }
    if !fs.allow_git_config {
        let pattern = format!("**/{GIT_CONFIG_FILE}");
        p.push_str(&format!(
            "(deny file-write* (regex #\"{}\"))\n",
            glob_to_regex(&pattern)
        ));
    }

    // Concrete instances in cwd and home also get unlink protection.
    if let Ok(cwd) = std::env::current_dir() {
        collect_concrete_dangerous(&cwd, fs, unlink_protect);
    }
    if let Some(home) = dirs::home_dir() {
        collect_concrete_dangerous(&home, fs, unlink_protect);
    }
}

fn collect_concrete_dangerous(root: &Path, fs: &FilesystemConfig, out: &mut Vec<PathBuf>) {
    for file in DANGEROUS_FILES {
        let path = root.join(file);
        if path.exists() {
            out.push(path);
        }
    }
    for dir in DANGEROUS_DIRECTORIES {
        let path = root.join(dir);
        if path.exists() {
            out.push(path);
        }
    }
    let hooks = root.join(GIT_HOOKS_DIR);
    if hooks.exists() {
        out.push(hooks);
    }
    if !fs.allow_git_config {
        let git_config = root.join(GIT_CONFIG_FILE);
        if git_config.exists() {
            out.push(git_config);
        }
    }
}

/// The sandbox TMPDIR (and the per-user darwin temp dir with its
/// /private twin) must stay writable or nothing runs.
fn tmp_write_roots() -> Vec<PathBuf> {
    let mut roots = vec![PathBuf::from("/tmp/fence"), PathBuf::from("/private/tmp/fence")];
    if let Ok(tmpdir) = std::env::var("TMPDIR") {
        let t_dir = PathBuf::from(tmpdir.trim_end_matches('/'));
        if let Some(name) = t_dir.to_str() {
            roots.push(t_dir.clone());
            if let Some(stripped) = name.strip_prefix("/var/") {
                roots.push(PathBuf::from(format!("/private/var/{stripped}")));
            }
        }
    }
    roots
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tag_round_trips_command() {
        let tag = generate_log_tag("echo hello");
        assert!(tag.starts_with("CMD64_"));
        assert!(tag.ends_with(LOG_TAG_SUFFIX));
        assert_eq!(decode_command_from_tag(&tag), Some("echo hello".to_string()));
    }

    #[test]
    fn log_tag_truncates_long_commands() {
        let long = "x".repeat(500);
        let tag = generate_log_tag(&long);
        let decoded = decode_command_from_tag(&tag).unwrap();
        assert_eq!(decoded.len(), 100);
    }

    #[test]
    fn profile_denies_by_default_with_tag() {
        let config = FenceConfig::default();
        let profile = generate_profile(&config, 3128, 1080, "CMD64_x_END_0_SBX");
        assert!(profile.starts_with("(version 1)"));
        assert!(profile.contains("(deny default (with message \"CMD64_x_END_0_SBX\"))"));
        assert!(profile.contains("(allow process-exec*)"));
        assert!(profile.contains("(allow file-read*)"));
    }

    #[test]
    fn wildcard_all_emits_allow_network_star() {
        let mut config = FenceConfig::default();
        config.network.allowed_domains = vec!["*".to_string()];
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains("(allow network*)\n"));

        config.network.allowed_domains = vec!["*.openai.com".to_string()];
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(!profile.contains("(allow network*)\n"));
        assert!(profile.contains("localhost:3128"));
        assert!(profile.contains("localhost:1080"));
    }

    #[test]
    fn local_outbound_follows_binding_by_default() {
        let mut config = FenceConfig::default();
        config.network.allow_local_binding = true;
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains("(allow network-bind network-inbound (local ip \"localhost:*\"))"));
        assert!(profile.contains("(allow network-outbound (remote ip \"localhost:*\"))"));

        config.network.allow_local_outbound = Some(false);
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(!profile.contains("(allow network-outbound (remote ip \"localhost:*\"))"));
    }

    #[test]
    fn deny_read_globs_become_regex_rules() {
        let mut config = FenceConfig::default();
        config.filesystem.deny_read = vec!["/secrets/**".to_string()];
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains("(deny file-read* (regex #\"^/secrets/.*$\"))"));
    }

    #[test]
    fn mandatory_denies_are_present_and_git_config_gated() {
        let config = FenceConfig::default();
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains(".gitconfig"));
        assert!(profile.contains(".git/hooks"));
        assert!(profile.contains(".git/config"));

        let mut config = FenceConfig::default();
        config.filesystem.allow_git_config = true;
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains(".git/hooks"));
        assert!(!profile.contains("\\.git/config"));
    }

    #[test]
    fn pty_rules_are_opt_in() {
        let config = FenceConfig::default();
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(!profile.contains("pseudo-tty"));

        let config = FenceConfig {
            allow_pty: true,
            ..Default::default()
        };
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains("(allow pseudo-tty)"));
    }

    #[test]
    fn unlink_denies_cover_ancestors() {
        let mut config = FenceConfig::default();
        config.filesystem.deny_write = vec!["/srv/app/secrets".to_string()];
        let profile = generate_profile(&config, 3128, 1080, "t_SBX");
        assert!(profile.contains("(deny file-write-unlink (literal \"/srv/app/secrets\"))"));
        assert!(profile.contains("(deny file-write-unlink (literal \"/srv/app\"))"));
        assert!(profile.contains("(deny file-write-unlink (literal \"/srv\"))"));
    }

    #[test]
    fn escape_quotes_and_backslashes() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a\"b"), "a\\\"b");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }
}
