//! Violation monitoring via the macOS unified log.
//!
//! Kernel denial lines carry the profile's log tag verbatim, so a single
//! `log stream` subscription filtered on the tag suffix covers exactly the
//! current invocation.

use std::process::Stdio;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::FenceError;
use crate::sandbox::macos::profile::LOG_TAG_SUFFIX;
use crate::violation::{ViolationEvent, ViolationSource, ViolationStore};

/// `Sandbox: processName(pid) deny(1) operation detail`
static DENIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Sandbox: (\w+)\((\d+)\) deny\(\d+\) (\S+)(.*)").unwrap()
});

/// Operations worth reporting.
const REPORTED_PREFIXES: &[&str] = &["network-", "file-read", "file-write"];

/// Noise from terminals and system daemons that every process trips over.
const SUPPRESSED_FRAGMENTS: &[&str] = &[
    "/dev/tty",
    "/dev/pts",
    "mDNSResponder",
    "/var/run/syslog",
];

/// A running `log stream` subscription.
pub struct LogMonitor {
    child: Option<Child>,
}

impl LogMonitor {
    /// Subscribe to denials carrying `log_tag` and feed them to the store.
    pub async fn start(log_tag: String, store: Arc<ViolationStore>) -> Result<Self, FenceError> {
        let predicate = format!("eventMessage ENDSWITH \"{LOG_TAG_SUFFIX}\"");
        let mut child = Command::new("log")
            .args(["stream", "--predicate", &predicate, "--style", "compact"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FenceError::Setup(format!("log stream: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FenceError::Setup("log stream stdout missing".to_string()))?;

        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.contains(&log_tag) {
                    continue;
                }
                if let Some(event) = parse_denial(&line) {
                    store.add(event);
                }
            }
        });

        Ok(Self { child: Some(child) })
    }

    pub async fn stop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.kill().await;
        }
        self.child = None;
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Parse one stream line into an event, filtering to interesting
/// operations and dropping known noise.
pub fn parse_denial(line: &str) -> Option<ViolationEvent> {
    let captures = DENIAL_RE.captures(line)?;
    let process = captures.get(1)?.as_str().to_string();
    let operation = captures.get(3)?.as_str().to_string();
    let detail = captures.get(4).map(|m| m.as_str()).unwrap_or("");

    if !REPORTED_PREFIXES
        .iter()
        .any(|prefix| operation.starts_with(prefix))
    {
        return None;
    }
    if SUPPRESSED_FRAGMENTS
        .iter()
        .any(|fragment| detail.contains(fragment) || process.contains(fragment))
    {
        return None;
    }

    Some(ViolationEvent::parsed(
        line.to_string(),
        ViolationSource::MacosLog,
        operation,
        process,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_write_denial() {
        let line = "Sandbox: curl(123) deny(1) file-write-data /etc/hosts CMD64_x_END_0_SBX";
        let event = parse_denial(line).unwrap();
        assert_eq!(event.operation.as_deref(), Some("file-write-data"));
        assert_eq!(event.process.as_deref(), Some("curl"));
    }

    #[test]
    fn ignores_unreported_operations() {
        let line = "Sandbox: thing(9) deny(1) mach-lookup com.apple.foo";
        assert!(parse_denial(line).is_none());
    }

    #[test]
    fn suppresses_tty_noise() {
        let line = "Sandbox: zsh(42) deny(1) file-write-data /dev/ttys003";
        assert!(parse_denial(line).is_none());
    }

    #[test]
    fn ignores_non_denial_lines() {
        assert!(parse_denial("completely unrelated").is_none());
    }

    #[test]
    fn network_denials_are_reported() {
        let line = "Sandbox: curl(7) deny(1) network-outbound 93.184.216.34:443";
        let event = parse_denial(line).unwrap();
        assert_eq!(event.operation.as_deref(), Some("network-outbound"));
    }
}
