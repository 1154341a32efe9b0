//! Configuration loading and inheritance resolution.
//!
//! Documents are JSON with C-style comments permitted. Templates and user
//! files share one load path, so either may `extends` the other.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::merge::{merge, MAX_INHERITANCE_DEPTH};
use crate::config::schema::FenceConfig;
use crate::config::templates;
use crate::error::{ConfigError, FenceError};
use crate::utils::path::absolute_clean;

/// Default settings file name under the home directory.
const DEFAULT_SETTINGS_FILE: &str = ".fence.json";

/// Path to `~/.fence.json`, when a home directory exists.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_SETTINGS_FILE))
}

/// Load a configuration file and resolve its inheritance chain.
pub fn load_file(path: &Path) -> Result<FenceConfig, FenceError> {
    let mut seen = HashSet::new();
    load_file_inner(path, &mut seen, 0)
}

/// Load a built-in template and resolve its inheritance chain.
pub fn load_template(name: &str) -> Result<FenceConfig, FenceError> {
    let mut seen = HashSet::new();
    load_template_inner(name, &mut seen, 0)
}

/// Load from the default path, or an empty configuration if absent.
pub fn load_default() -> Result<FenceConfig, FenceError> {
    match default_settings_path() {
        Some(path) if path.exists() => load_file(&path),
        _ => Ok(FenceConfig::default()),
    }
}

/// Parse one document from text. An empty or whitespace-only document is
/// equivalent to no file. Does not resolve `extends`.
pub fn parse_config(text: &str) -> Result<FenceConfig, FenceError> {
    let stripped = strip_comments(text);
    if stripped.trim().is_empty() {
        return Ok(FenceConfig::default());
    }
    let config: FenceConfig = serde_json::from_str(&stripped)
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

fn load_file_inner(
    path: &Path,
    seen: &mut HashSet<String>,
    depth: usize,
) -> Result<FenceConfig, FenceError> {
    let identity = format!("file:{}", absolute_clean(path).display());
    check_reference(&identity, path.display().to_string(), seen, depth)?;

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()).into());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {}", path.display(), e)))?;
    let doc = parse_config(&text)?;
    let base_dir = path.parent().map(|p| p.to_path_buf());
    resolve_extends(doc, base_dir.as_deref(), seen, depth)
}

fn load_template_inner(
    name: &str,
    seen: &mut HashSet<String>,
    depth: usize,
) -> Result<FenceConfig, FenceError> {
    let identity = format!("template:{}", name);
    check_reference(&identity, name.to_string(), seen, depth)?;

    let template = templates::find(name)
        .ok_or_else(|| ConfigError::UnknownTemplate(name.to_string()))?;
    let doc = parse_config(template.json)?;
    // Templates have no directory; relative parents resolve against cwd.
    resolve_extends(doc, None, seen, depth)
}

fn resolve_extends(
    doc: FenceConfig,
    base_dir: Option<&Path>,
    seen: &mut HashSet<String>,
    depth: usize,
) -> Result<FenceConfig, FenceError> {
    let reference = match &doc.extends {
        Some(reference) => reference.clone(),
        None => return Ok(doc),
    };

    let parent = if is_template_reference(&reference) {
        load_template_inner(&reference, seen, depth + 1)?
    } else {
        let parent_path = match base_dir {
            Some(dir) if !Path::new(&reference).is_absolute() => dir.join(&reference),
            _ => PathBuf::from(&reference),
        };
        load_file_inner(&parent_path, seen, depth + 1)?
    };

    let merged = merge(&parent, &doc);
    merged.validate()?;
    Ok(merged)
}

fn check_reference(
    identity: &str,
    display: String,
    seen: &mut HashSet<String>,
    depth: usize,
) -> Result<(), FenceError> {
    if depth > MAX_INHERITANCE_DEPTH {
        return Err(ConfigError::InheritanceTooDeep {
            reference: display,
            max: MAX_INHERITANCE_DEPTH,
        }
        .into());
    }
    if !seen.insert(identity.to_string()) {
        return Err(ConfigError::InheritanceCycle(display).into());
    }
    Ok(())
}

/// A template name has no slash and no leading dot; anything else is a path.
fn is_template_reference(reference: &str) -> bool {
    !reference.contains('/') && !reference.starts_with('.')
}

/// Remove `//` and `/* */` comments outside of string literals.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1] as char);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}
