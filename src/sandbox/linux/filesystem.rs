//! Bind-mount plan for bubblewrap.
//!
//! Writable binds are emitted first; read-only and tmpfs mounts layer on
//! top, so a deny always wins over an overlapping allow. The mandatory-deny
//! set is applied last and is independent of configuration.

use std::path::{Path, PathBuf};

use crate::config::{
    FilesystemConfig, DANGEROUS_DIRECTORIES, DANGEROUS_FILES, GIT_CONFIG_FILE, GIT_HOOKS_DIR,
};
use crate::utils::glob::expand_to_paths;

/// Scratch space writable in every sandbox. /tmp is a fresh tmpfs and needs
/// no bind.
const DEFAULT_WRITABLE_PATHS: &[&str] = &["/var/tmp", "/dev/shm"];

/// One bwrap mount argument group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindMount {
    /// `--bind path path`
    Writable(PathBuf),
    /// `--ro-bind path path`
    ReadOnly(PathBuf),
    /// `--tmpfs path` (hides the underlying tree)
    Tmpfs(PathBuf),
}

impl BindMount {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            BindMount::Writable(path) => vec![
                "--bind".to_string(),
                path.display().to_string(),
                path.display().to_string(),
            ],
            BindMount::ReadOnly(path) => vec![
                "--ro-bind".to_string(),
                path.display().to_string(),
                path.display().to_string(),
            ],
            BindMount::Tmpfs(path) => {
                vec!["--tmpfs".to_string(), path.display().to_string()]
            }
        }
    }
}

/// Build the mount plan: writable union first, then read hides, then write
/// denies, then the mandatory-deny layer.
pub fn generate_mounts(
    config: &FilesystemConfig,
    cwd: &Path,
    extra_writable: &[PathBuf],
) -> Vec<BindMount> {
    let mut mounts = Vec::new();

    // Default writable paths plus user allowWrite, resolved to concrete
    // paths. Only existing paths can be bind-mounted.
    let mut writable: Vec<PathBuf> = DEFAULT_WRITABLE_PATHS
        .iter()
        .map(|path| PathBuf::from(*path))
        .collect();
    writable.extend(expand_to_paths(&config.allow_write, cwd));
    writable.extend(extra_writable.iter().cloned());
    for path in dedup(writable) {
        if path.exists() {
            mounts.push(BindMount::Writable(path));
        } else {
            tracing::warn!("allowWrite path does not exist, skipping: {}", path.display());
        }
    }

    for path in dedup(expand_to_paths(&config.deny_read, cwd)) {
        mounts.push(BindMount::Tmpfs(path));
    }

    for path in dedup(expand_to_paths(&config.deny_write, cwd)) {
        if path.exists() {
            mounts.push(BindMount::ReadOnly(path));
        }
    }

    for path in mandatory_deny_paths(config, cwd) {
        mounts.push(BindMount::ReadOnly(path));
    }

    mounts
}

/// Paths that must never be writable, resolved against cwd and the home
/// directory. Only existing paths are returned.
pub fn mandatory_deny_paths(config: &FilesystemConfig, cwd: &Path) -> Vec<PathBuf> {
    let mut roots = vec![cwd.to_path_buf()];
    if let Some(home) = dirs::home_dir() {
        if home != cwd {
            roots.push(home);
        }
    }

    let mut paths = Vec::new();
    for root in &roots {
        for file in DANGEROUS_FILES {
            let path = root.join(file);
            if path.exists() {
                paths.push(path);
            }
        }
        for dir in DANGEROUS_DIRECTORIES {
            let path = root.join(dir);
            if path.exists() {
                paths.push(path);
            }
        }
        let hooks = root.join(GIT_HOOKS_DIR);
        if hooks.exists() {
            paths.push(hooks);
        }
        if !config.allow_git_config {
            let git_config = root.join(GIT_CONFIG_FILE);
            if git_config.exists() {
                paths.push(git_config);
            }
        }
    }
    dedup(paths)
}

fn dedup(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !out.contains(&path) {
            out.push(path);
        }
    }
    out
}
