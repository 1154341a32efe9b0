//! sandbox-exec command assembly for macOS.

use crate::config::FenceConfig;
use crate::error::FenceError;
use crate::sandbox::macos::profile::{generate_log_tag, generate_profile};
use crate::utils::shell::quote;

/// The TMPDIR exported to the child; created by the supervisor.
pub const SANDBOX_TMPDIR: &str = "/tmp/fence";

/// A wrapped macOS command and the tag its denials will carry.
pub struct MacosCommand {
    pub script: String,
    pub log_tag: String,
}

/// Wrap a command with `env <vars> sandbox-exec -p <profile> sh -c <cmd>`.
pub fn build_wrapper(
    command: &str,
    config: &FenceConfig,
    http_proxy_port: u16,
    socks_proxy_port: u16,
) -> Result<MacosCommand, FenceError> {
    let log_tag = generate_log_tag(command);
    let profile = generate_profile(config, http_proxy_port, socks_proxy_port, &log_tag);

    let mut parts: Vec<String> = vec!["env".to_string()];
    for (key, value) in proxy_env(http_proxy_port, socks_proxy_port) {
        parts.push(format!("{key}={}", quote(&value)));
    }
    parts.push(format!("TMPDIR={SANDBOX_TMPDIR}"));
    parts.push("FENCE_SANDBOX=1".to_string());
    parts.push("sandbox-exec".to_string());
    parts.push("-p".to_string());
    parts.push(quote(&profile));
    parts.push("/bin/sh".to_string());
    parts.push("-c".to_string());
    parts.push(quote(command));

    Ok(MacosCommand {
        script: parts.join(" "),
        log_tag,
    })
}

/// Proxy variables for the child. The proxies listen on host loopback,
/// directly reachable on macOS (no network namespace in the way).
pub fn proxy_env(http_port: u16, socks_port: u16) -> Vec<(String, String)> {
    let http = format!("http://127.0.0.1:{http_port}");
    let socks = format!("socks5h://127.0.0.1:{socks_port}");
    vec![
        ("HTTP_PROXY".to_string(), http.clone()),
        ("http_proxy".to_string(), http.clone()),
        ("HTTPS_PROXY".to_string(), http.clone()),
        ("https_proxy".to_string(), http),
        ("ALL_PROXY".to_string(), socks.clone()),
        ("all_proxy".to_string(), socks),
        ("NO_PROXY".to_string(), "localhost,127.0.0.1".to_string()),
        ("no_proxy".to_string(), "localhost,127.0.0.1".to_string()),
    ]
}
