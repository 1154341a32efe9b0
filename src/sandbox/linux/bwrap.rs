//! bubblewrap wrapper assembly.
//!
//! The outer command opens the seccomp filter on fd 3 and execs bwrap; the
//! inner script sets up the socat listeners and proxy environment, then
//! hands off to the Landlock wrapper (or straight to the user command).

use std::path::{Path, PathBuf};

use crate::config::FenceConfig;
use crate::error::FenceError;
use crate::sandbox::linux::bridge::SocatBridge;
use crate::sandbox::linux::features::LinuxFeatures;
use crate::sandbox::linux::filesystem::generate_mounts;
use crate::sandbox::linux::landlock;
use crate::sandbox::linux::seccomp::SeccompFilterFile;
use crate::utils::shell::quote;

/// Fixed in-sandbox proxy ports; the real host ports are hidden behind the
/// Unix-socket bridges.
pub const INNER_HTTP_PORT: u16 = 3128;
pub const INNER_SOCKS_PORT: u16 = 1080;

/// Everything the supervisor needs to run the sandboxed child.
pub struct LinuxCommand {
    /// Shell script for `/bin/sh -c`.
    pub script: String,
    /// Keeps the serialized filter alive for the child's lifetime.
    pub seccomp: Option<SeccompFilterFile>,
}

/// Inputs to wrapper assembly.
pub struct WrapperSpec<'a> {
    pub command: &'a str,
    pub config: &'a FenceConfig,
    pub cwd: &'a Path,
    /// Bridge directory bind-mounted into the sandbox.
    pub bridge_dir: &'a Path,
    pub http_socket: &'a Path,
    pub socks_socket: &'a Path,
    /// User-exposed ports with their in-bridge-dir socket paths.
    pub inbound: &'a [(u16, PathBuf)],
}

/// Assemble the full bwrap invocation.
pub fn build_wrapper(
    spec: &WrapperSpec<'_>,
    features: &LinuxFeatures,
) -> Result<LinuxCommand, FenceError> {
    let seccomp = if features.seccomp {
        match SeccompFilterFile::write() {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::debug!("seccomp filter unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut args: Vec<String> = vec![
        "bwrap".to_string(),
        "--new-session".to_string(),
        "--die-with-parent".to_string(),
        "--unshare-pid".to_string(),
    ];

    // A wildcard-all allow list turns network isolation off so programs
    // that ignore HTTP_PROXY still reach the network; proxy-level policy
    // continues to apply to the ones that honor it.
    if features.netns && !spec.config.network.allows_all_domains() {
        args.push("--unshare-net".to_string());
    }

    args.extend(
        ["--ro-bind", "/", "/", "--dev-bind", "/dev", "/dev", "--proc", "/proc", "--tmpfs", "/tmp"]
            .iter()
            .map(|s| s.to_string()),
    );

    let extra_writable = vec![spec.bridge_dir.to_path_buf()];
    for mount in generate_mounts(&spec.config.filesystem, spec.cwd, &extra_writable) {
        args.extend(mount.to_args());
    }

    args.push("--chdir".to_string());
    args.push(spec.cwd.display().to_string());

    if seccomp.is_some() {
        args.push("--seccomp".to_string());
        args.push("3".to_string());
    }

    let inner = build_inner_script(spec);
    args.push("--".to_string());
    args.push("/bin/sh".to_string());
    args.push("-c".to_string());
    args.push(inner);

    let bwrap = args.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ");
    let script = match &seccomp {
        Some(filter) => format!("exec 3< {}; exec {bwrap}", quote(&filter.path().display().to_string())),
        None => format!("exec {bwrap}"),
    };

    Ok(LinuxCommand { script, seccomp })
}

/// The stanza run as pid 2 inside the sandbox.
fn build_inner_script(spec: &WrapperSpec<'_>) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "{} &",
        SocatBridge::inner_proxy_listener(
            INNER_HTTP_PORT,
            &spec.http_socket.display().to_string()
        )
    ));
    lines.push(format!(
        "{} &",
        SocatBridge::inner_proxy_listener(
            INNER_SOCKS_PORT,
            &spec.socks_socket.display().to_string()
        )
    ));

    let http_proxy = format!("http://127.0.0.1:{INNER_HTTP_PORT}");
    let socks_proxy = format!("socks5h://127.0.0.1:{INNER_SOCKS_PORT}");
    lines.push(format!(
        "export HTTP_PROXY={http} http_proxy={http} HTTPS_PROXY={http} https_proxy={http} \
         ALL_PROXY={socks} all_proxy={socks} NO_PROXY=localhost,127.0.0.1 \
         no_proxy=localhost,127.0.0.1 FENCE_SANDBOX=1",
        http = http_proxy,
        socks = socks_proxy,
    ));

    for (port, socket) in spec.inbound {
        lines.push(format!(
            "{} &",
            SocatBridge::inner_inbound_listener(*port, &socket.display().to_string())
        ));
    }

    lines.push("trap 'kill $(jobs -p) 2>/dev/null' EXIT".to_string());
    lines.push("sleep 0.1".to_string());

    if landlock::wrapper_available() {
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "fence".to_string());
        let debug_flag = if crate::utils::debug::is_debug_enabled() {
            " --debug"
        } else {
            ""
        };
        lines.push(format!(
            "exec {}{debug_flag} --landlock-apply -- /bin/sh -c {}",
            quote(&exe),
            quote(spec.command)
        ));
    } else {
        lines.push(format!("/bin/sh -c {}", quote(spec.command)));
    }

    lines.join("\n")
}
