//! Shell string decomposition for policy checks.
//!
//! A command line is split into fragments at top-level `|`, `||`, `&&`, and
//! `;`. Quoted regions never split; parenthesized groups stay whole. Nested
//! shell invocations (`sh -c '...'` and friends) are expanded so the inner
//! command line is checked alongside the outer fragment.

use crate::utils::shell::{basename, tokenize};

/// Shells whose `-c` payload is itself a command line.
const NESTED_SHELLS: &[&str] = &["sh", "bash", "zsh", "ksh", "dash", "fish"];

/// Split a command string into top-level fragments.
pub fn split_commands(input: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut depth: usize = 0;

    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if in_single {
            current.push(c);
            if c == '\'' {
                in_single = false;
            }
            i += 1;
            continue;
        }
        if in_double {
            current.push(c);
            if c == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                in_single = true;
                current.push(c);
            }
            '"' => {
                in_double = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if depth == 0 => {
                // `|` and `||` both split.
                flush(&mut current, &mut fragments);
                if chars.get(i + 1) == Some(&'|') {
                    i += 1;
                }
            }
            '&' if depth == 0 => {
                if chars.get(i + 1) == Some(&'&') {
                    flush(&mut current, &mut fragments);
                    i += 1;
                } else {
                    // A lone `&` backgrounds the command; keep it.
                    current.push(c);
                }
            }
            ';' if depth == 0 => {
                flush(&mut current, &mut fragments);
            }
            _ => current.push(c),
        }
        i += 1;
    }
    flush(&mut current, &mut fragments);
    fragments
}

fn flush(current: &mut String, fragments: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
    current.clear();
}

/// Split a command string and expand nested shell invocations. Each outer
/// fragment is emitted, followed by the fragments of any `-c` payload it
/// carries, recursively.
pub fn expand_fragments(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    for fragment in split_commands(input) {
        expand_into(&fragment, &mut out);
    }
    out
}

fn expand_into(fragment: &str, out: &mut Vec<String>) {
    out.push(fragment.to_string());
    if let Some(payload) = nested_shell_payload(fragment) {
        for inner in split_commands(&payload) {
            expand_into(&inner, out);
        }
    }
}

/// If the fragment invokes a shell with an option bundle containing `c`
/// followed by a command string, return that command string.
fn nested_shell_payload(fragment: &str) -> Option<String> {
    let tokens = tokenize(fragment);
    let first = tokens.first()?;
    if !NESTED_SHELLS.contains(&basename(first)) {
        return None;
    }
    for (i, token) in tokens.iter().enumerate().skip(1) {
        if is_c_option_bundle(token) {
            if let Some(payload) = tokens.get(i + 1) {
                return Some(payload.clone());
            }
        }
    }
    None
}

/// Matches `-[a-z]*c[a-z]*`: any single-dash lowercase option bundle that
/// includes `c` (so `-c`, `-lc`, `-ec`, `-ci` all count).
fn is_c_option_bundle(token: &str) -> bool {
    match token.strip_prefix('-') {
        Some(rest) if !rest.is_empty() => {
            rest.chars().all(|c| c.is_ascii_lowercase()) && rest.contains('c')
        }
        _ => false,
    }
}

/// Normalize a fragment: trim, tokenize, take the basename of the head
/// token, rejoin single-spaced.
pub fn normalize(fragment: &str) -> String {
    let mut tokens = tokenize(fragment.trim());
    if tokens.is_empty() {
        return String::new();
    }
    tokens[0] = basename(&tokens[0]).to_string();
    tokens.join(" ")
}
