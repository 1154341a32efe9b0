//! Path normalization utilities.

use std::path::{Path, PathBuf};

/// Normalize a path for policy use.
/// - Expands a leading ~ to the home directory
/// - Resolves relative paths against the current working directory
/// - Glob metacharacters are preserved verbatim
pub fn normalize_path(path: &str) -> String {
    let expanded = expand_home(path);
    let joined = if Path::new(&expanded).is_absolute() {
        PathBuf::from(&expanded)
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&expanded),
            Err(_) => PathBuf::from(&expanded),
        }
    };
    clean_path(&joined).display().to_string()
}

/// Expand ~ to the home directory.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).display().to_string();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.display().to_string();
        }
    }
    path.to_string()
}

/// Check if a path contains glob characters.
pub fn contains_glob_chars(path: &str) -> bool {
    path.contains('*') || path.contains('?') || path.contains('[') || path.contains('{')
}

/// Lexically clean a path: resolve `.` and `..` components without touching
/// the filesystem. Used for inheritance cycle detection where the file may
/// be read through different relative spellings.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, cleaned form of a path for identity comparison.
pub fn absolute_clean(path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        match std::env::current_dir() {
            Ok(cwd) => clean_path(&cwd.join(path)),
            Err(_) => clean_path(path),
        }
    }
}

/// All ancestor directories of a path, nearest first, excluding the root.
pub fn ancestor_dirs(path: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut current = path.parent();
    while let Some(parent) = current {
        if parent.as_os_str().is_empty() || parent == Path::new("/") {
            break;
        }
        out.push(parent.to_path_buf());
        current = parent.parent();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_variants() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~"), home.display().to_string());
        assert_eq!(
            expand_home("~/projects"),
            home.join("projects").display().to_string()
        );
        assert_eq!(expand_home("/etc/hosts"), "/etc/hosts");
        assert_eq!(expand_home("relative/path"), "relative/path");
    }

    #[test]
    fn normalize_keeps_glob_chars() {
        let normalized = normalize_path("/srv/data/**/*.log");
        assert_eq!(normalized, "/srv/data/**/*.log");
    }

    #[test]
    fn normalize_resolves_relative_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            normalize_path("build/out"),
            cwd.join("build/out").display().to_string()
        );
    }

    #[test]
    fn glob_char_detection() {
        assert!(contains_glob_chars("*.txt"));
        assert!(contains_glob_chars("src/**"));
        assert!(contains_glob_chars("log?.txt"));
        assert!(contains_glob_chars("f[0-9]"));
        assert!(!contains_glob_chars("/plain/path"));
    }

    #[test]
    fn clean_path_resolves_dots() {
        assert_eq!(
            clean_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn ancestors_exclude_root() {
        let dirs = ancestor_dirs(Path::new("/a/b/c.txt"));
        assert_eq!(dirs, vec![PathBuf::from("/a/b"), PathBuf::from("/a")]);
    }
}
