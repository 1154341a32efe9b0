//! Domain and SSH host pattern matching.

/// Check a hostname against a domain pattern.
/// `*` matches everything; `*.base` matches hosts ending in `.base` but not
/// `base` itself; anything else is an exact case-insensitive match.
pub fn matches_domain(hostname: &str, pattern: &str) -> bool {
    let hostname = hostname.to_lowercase();
    let pattern = pattern.to_lowercase();

    if pattern == "*" {
        return true;
    }
    if let Some(base) = pattern.strip_prefix("*.") {
        return hostname.ends_with(&format!(".{}", base));
    }
    hostname == pattern
}

/// Check a host against an SSH host pattern with `*` wildcards anywhere.
/// The host must start with the first literal piece, end with the last, and
/// contain the middle pieces in order.
pub fn matches_host(host: &str, pattern: &str) -> bool {
    let host = host.to_lowercase();
    let pattern = pattern.to_lowercase();

    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return host == pattern;
    }

    let pieces: Vec<&str> = pattern.split('*').collect();
    let first = pieces[0];
    let last = pieces[pieces.len() - 1];

    if !host.starts_with(first) {
        return false;
    }
    let mut rest = &host[first.len()..];
    for piece in &pieces[1..pieces.len() - 1] {
        if piece.is_empty() {
            continue;
        }
        match rest.find(piece) {
            Some(at) => rest = &rest[at + piece.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
