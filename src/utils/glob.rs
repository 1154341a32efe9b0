//! Expansion of glob patterns into concrete filesystem paths.
//!
//! The kernel-side enforcement primitives (bind mounts, Landlock rules) take
//! concrete paths, so configured patterns are resolved up front:
//! - a pattern without glob characters is used as-is;
//! - `dir/**` collapses to `dir` (the mount covers all descendants);
//! - a pattern starting with `**/` walks the working directory;
//! - any other pattern with `*` goes through a scoped glob.

use std::path::{Path, PathBuf};

use crate::utils::path::{contains_glob_chars, normalize_path};

/// Expand a set of patterns into concrete paths, preserving input order and
/// dropping duplicates. `cwd` scopes `**/` walks.
pub fn expand_to_paths(patterns: &[String], cwd: &Path) -> Vec<PathBuf> {
    // Roots taken whole via `dir/**`; their subtrees need no walking.
    let covered: Vec<PathBuf> = patterns
        .iter()
        .filter_map(|p| doublestar_root(p))
        .collect();

    let mut out: Vec<PathBuf> = Vec::new();
    for raw in patterns {
        if raw.starts_with("**/") {
            walk_matching(raw, cwd, &covered, &mut out);
            continue;
        }
        let pattern = normalize_path(raw);
        if !contains_glob_chars(&pattern) {
            push_unique(&mut out, PathBuf::from(pattern));
        } else if let Some(root) = doublestar_root(&pattern) {
            push_unique(&mut out, root);
        } else if let Ok(matches) = glob::glob(&pattern) {
            for path in matches.flatten() {
                push_unique(&mut out, path);
            }
        }
    }
    out
}

/// `dir/**` (optionally with a trailing slash) covers the whole subtree
/// rooted at `dir`.
fn doublestar_root(pattern: &str) -> Option<PathBuf> {
    let trimmed = pattern.strip_suffix('/').unwrap_or(pattern);
    let root = trimmed.strip_suffix("/**")?;
    if root.is_empty() || contains_glob_chars(root) {
        return None;
    }
    Some(PathBuf::from(normalize_path(root)))
}

/// Walk `cwd` collecting entries matching a `**/`-prefixed pattern, skipping
/// subtrees already covered by a `dir/**` pattern from the same input set.
/// The tail pattern handles the zero-directory case (`**/x` matches `x`).
fn walk_matching(pattern: &str, cwd: &Path, covered: &[PathBuf], out: &mut Vec<PathBuf>) {
    let full = match glob::Pattern::new(pattern) {
        Ok(p) => p,
        Err(_) => return,
    };
    let tail = pattern
        .strip_prefix("**/")
        .and_then(|rest| glob::Pattern::new(rest).ok());
    walk_dir(cwd, cwd, &full, tail.as_ref(), covered, out);
}

fn walk_dir(
    dir: &Path,
    cwd: &Path,
    full: &glob::Pattern,
    tail: Option<&glob::Pattern>,
    covered: &[PathBuf],
    out: &mut Vec<PathBuf>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if covered.iter().any(|root| path.starts_with(root)) {
            continue;
        }
        let relative = path.strip_prefix(cwd).unwrap_or(&path);
        if full.matches_path(relative)
            || tail.map(|t| t.matches_path(relative)).unwrap_or(false)
        {
            push_unique(out, path.clone());
        }
        if path.is_dir() && !entry.file_type().map(|t| t.is_symlink()).unwrap_or(true) {
            walk_dir(&path, cwd, full, tail, covered, out);
        }
    }
}

fn push_unique(out: &mut Vec<PathBuf>, path: PathBuf) {
    if !out.contains(&path) {
        out.push(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_paths_pass_through() {
        let out = expand_to_paths(&strings(&["/var/data"]), Path::new("/"));
        assert_eq!(out, vec![PathBuf::from("/var/data")]);
    }

    #[test]
    fn doublestar_suffix_collapses_to_root() {
        let out = expand_to_paths(&strings(&["/srv/cache/**"]), Path::new("/"));
        assert_eq!(out, vec![PathBuf::from("/srv/cache")]);
    }

    #[test]
    fn doublestar_root_rejects_globby_base() {
        assert_eq!(doublestar_root("/srv/*/cache/**"), None);
        assert_eq!(
            doublestar_root("/srv/cache/**"),
            Some(PathBuf::from("/srv/cache"))
        );
    }

    #[test]
    fn leading_doublestar_walks_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("a/target")).unwrap();
        std::fs::create_dir_all(root.join("target")).unwrap();
        std::fs::write(root.join("a/file.txt"), b"x").unwrap();

        let out = expand_to_paths(&strings(&["**/target"]), root);
        assert!(out.contains(&root.join("target")));
        assert!(out.contains(&root.join("a/target")));
        assert!(!out.iter().any(|p| p.ends_with("file.txt")));
    }

    #[test]
    fn walk_skips_covered_subtrees() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("vendor/target")).unwrap();
        std::fs::create_dir_all(root.join("src/target")).unwrap();

        let patterns = strings(&[&format!("{}/vendor/**", root.display()), "**/target"]);
        let out = expand_to_paths(&patterns, root);
        assert!(out.contains(&root.join("vendor")));
        assert!(out.contains(&root.join("src/target")));
        assert!(!out.contains(&root.join("vendor/target")));
    }

    #[test]
    fn scoped_glob_expands_single_star() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("a.log"), b"x").unwrap();
        std::fs::write(root.join("b.log"), b"x").unwrap();
        std::fs::write(root.join("c.txt"), b"x").unwrap();

        let pattern = format!("{}/*.log", root.display());
        let out = expand_to_paths(&[pattern], root);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.extension().unwrap() == "log"));
    }
}
