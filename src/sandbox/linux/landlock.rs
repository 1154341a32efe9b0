//! Landlock ruleset application.
//!
//! Landlock restricts the calling process and its descendants, so the
//! ruleset has to be installed after bubblewrap set up its namespaces but
//! before the user command runs. The supervisor arranges that by re-exec'ing
//! this binary inside the sandbox in `--landlock-apply` mode, with the
//! resolved configuration marshalled through `FENCE_CONFIG_JSON`.

use std::path::{Path, PathBuf};

use landlock::{
    Access, AccessFs, CompatLevel, Compatible, Ruleset, RulesetAttr, RulesetCreatedAttr, ABI,
};

use crate::config::FenceConfig;
use crate::sandbox::linux::features;
use crate::supervisor::env::hardened_env;
use crate::utils::glob::expand_to_paths;

/// Environment variable carrying the resolved configuration into the
/// re-exec'd wrapper.
pub const CONFIG_ENV: &str = "FENCE_CONFIG_JSON";

/// System roots readable and executable inside the sandbox.
const SYSTEM_ROOTS: &[&str] = &[
    "/usr", "/lib", "/lib64", "/lib32", "/bin", "/sbin", "/etc", "/proc", "/dev", "/sys", "/run",
    "/var/lib", "/var/cache",
];

/// Whether the re-exec wrapper can be used: the running executable must
/// still be the installed `fence` binary, not a test harness under /tmp.
pub fn wrapper_available() -> bool {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(_) => return false,
    };
    let is_fence = exe
        .file_name()
        .map(|name| name == "fence")
        .unwrap_or(false);
    is_fence && !exe.starts_with("/tmp")
}

/// Entry point for `fence --landlock-apply -- <cmd…>`. Applies the ruleset
/// (best effort) and execs the command with a scrubbed environment.
/// Returns only on failure to exec: 127 when the command is missing.
pub fn run_apply(args: &[String], debug: bool) -> u8 {
    if args.is_empty() {
        eprintln!("fence: --landlock-apply needs a command after --");
        return 1;
    }

    let config = std::env::var(CONFIG_ENV)
        .ok()
        .and_then(|json| serde_json::from_str::<FenceConfig>(&json).ok())
        .unwrap_or_default();

    // Landlock failure is never fatal: the mount namespace set up by bwrap
    // remains the primary enforcement layer.
    match apply_rules(&config) {
        Ok(()) => {
            if debug {
                eprintln!("fence: landlock ruleset applied");
            }
        }
        Err(e) => {
            if debug {
                eprintln!("fence: landlock unavailable: {e}");
            }
        }
    }

    exec_command(args)
}

fn exec_command(args: &[String]) -> u8 {
    use std::os::unix::process::CommandExt;

    let mut command = std::process::Command::new(&args[0]);
    command.args(&args[1..]);
    command.env_clear();
    for (key, value) in hardened_env() {
        if key == CONFIG_ENV {
            continue;
        }
        command.env(key, value);
    }

    let err = command.exec();
    if err.kind() == std::io::ErrorKind::NotFound {
        eprintln!("fence: command not found: {}", args[0]);
        127
    } else {
        eprintln!("fence: exec failed: {err}");
        1
    }
}

fn apply_rules(config: &FenceConfig) -> Result<(), landlock::RulesetError> {
    let abi = match features::detect().landlock_abi {
        Some(version) => abi_for(version),
        None => return Ok(()),
    };

    let access_all = AccessFs::from_all(abi);
    let access_read_exec = AccessFs::from_read(abi);
    let access_read = AccessFs::ReadFile | AccessFs::ReadDir;

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let read_write_paths = read_write_paths(config, &cwd);

    let mut read_only: Vec<PathBuf> = vec![cwd];
    if let Some(home) = dirs::home_dir() {
        read_only.push(home);
    }

    let status = Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(access_all)?
        .create()?
        .add_rules(landlock::path_beneath_rules(
            existing(SYSTEM_ROOTS.iter().map(|root| PathBuf::from(*root))),
            access_read_exec,
        ))?
        .add_rules(landlock::path_beneath_rules(
            existing(read_only),
            access_read,
        ))?
        .add_rules(landlock::path_beneath_rules(
            existing(read_write_paths),
            access_all,
        ))?
        .set_no_new_privs(true)
        .restrict_self()?;

    tracing::debug!(ruleset = ?status.ruleset, "landlock restriction status");
    Ok(())
}

/// /tmp, the bridge socket directories, and every concrete allowWrite path
/// get full read-write access.
fn read_write_paths(config: &FenceConfig, cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![std::env::temp_dir()];
    paths.extend(expand_to_paths(&config.filesystem.allow_write, cwd));
    paths
}

/// Non-existent paths are skipped; the rules only ever reference real files.
fn existing<I: IntoIterator<Item = PathBuf>>(paths: I) -> Vec<PathBuf> {
    paths.into_iter().filter(|p| p.exists()).collect()
}

fn abi_for(version: i32) -> ABI {
    match version {
        1 => ABI::V1,
        2 => ABI::V2,
        3 => ABI::V3,
        4 => ABI::V4,
        _ => ABI::V5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_mapping_is_monotonic() {
        assert!(matches!(abi_for(1), ABI::V1));
        assert!(matches!(abi_for(3), ABI::V3));
        assert!(matches!(abi_for(9), ABI::V5));
    }

    #[test]
    fn existing_filters_missing_paths() {
        let paths = existing(vec![
            PathBuf::from("/"),
            PathBuf::from("/definitely/not/here"),
        ]);
        assert_eq!(paths, vec![PathBuf::from("/")]);
    }

    #[test]
    fn wrapper_is_unavailable_under_test_harness() {
        // Cargo test binaries live under target/, are not named `fence`.
        assert!(!wrapper_available());
    }
}
