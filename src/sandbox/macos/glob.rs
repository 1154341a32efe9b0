//! Glob to profile-regex transformation.
//!
//! The sandbox profile language takes anchored regexes. The transformation
//! is conservative: `*` and `?` never cross a path separator, only `**/`
//! and `**` do. Substitution order matters: `**/` before `**` before `*`.

/// Convert a glob pattern into an anchored regex for profile rules.
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    if chars.get(i + 2) == Some(&'/') {
                        // `**/` spans zero or more directories.
                        out.push_str("(.*/)?");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c @ ('.' | '^' | '$' | '+' | '|' | '\\' | '(' | ')' | '[' | ']' | '{' | '}') => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn matches(pattern: &str, path: &str) -> bool {
        Regex::new(&glob_to_regex(pattern)).unwrap().is_match(path)
    }

    #[test]
    fn single_star_stays_within_one_component() {
        assert!(matches("/logs/*.log", "/logs/app.log"));
        assert!(!matches("/logs/*.log", "/logs/deep/app.log"));
    }

    #[test]
    fn doublestar_crosses_separators() {
        assert!(matches("/data/**", "/data/a"));
        assert!(matches("/data/**", "/data/a/b/c"));
    }

    #[test]
    fn doublestar_slash_spans_zero_directories() {
        assert!(matches("**/secrets.txt", "secrets.txt"));
        assert!(matches("**/secrets.txt", "a/b/secrets.txt"));
        assert!(!matches("**/secrets.txt", "a/b/secrets.txt.bak"));
    }

    #[test]
    fn question_mark_is_single_non_separator() {
        assert!(matches("file?.txt", "file1.txt"));
        assert!(!matches("file?.txt", "file.txt"));
        assert!(!matches("file?.txt", "file/a.txt"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert!(matches("/a.b/c+d", "/a.b/c+d"));
        assert!(!matches("/a.b/c+d", "/aXb/ccd"));
        assert!(matches("/p(1)/[x]", "/p(1)/[x]"));
    }

    #[test]
    fn anchored_rejects_prefix_escape() {
        assert!(!matches("/safe/*", "/safe/../etc/passwd"));
        assert!(!matches("/safe/*.txt", "/safe/a.txt.evil"));
        assert!(!matches("/safe/*", "prefix/safe/a"));
    }
}
