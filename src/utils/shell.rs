//! Shell quoting and tokenization helpers.

/// Quote a string for use in a shell command. Plain words pass through,
/// anything else is single-quoted with embedded quotes escaped.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if !needs_quoting(s) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

fn needs_quoting(s: &str) -> bool {
    s.chars().any(|c| {
        !(c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '-' | '_' | '=' | ':' | ',' | '%' | '+'))
    })
}

/// Join arguments into a single shell command string with quoting.
pub fn join_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|s| quote(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize a command string respecting single and double quotes.
/// Falls back to whitespace splitting when the string has unbalanced quotes,
/// so policy checks still see every word.
pub fn tokenize(s: &str) -> Vec<String> {
    match shell_words::split(s) {
        Ok(tokens) => tokens,
        Err(_) => s.split_whitespace().map(|t| t.to_string()).collect(),
    }
}

/// The final path component of a command word.
pub fn basename(s: &str) -> &str {
    s.rsplit('/').next().unwrap_or(s)
}
