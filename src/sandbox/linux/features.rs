//! Linux feature detection, probed once per process.

use once_cell::sync::Lazy;
use serde::Serialize;

/// What the running kernel and userland offer for confinement.
#[derive(Debug, Clone, Serialize)]
pub struct LinuxFeatures {
    /// bubblewrap found on PATH.
    pub bwrap: bool,
    /// socat found on PATH.
    pub socat: bool,
    /// Kernel release string.
    pub kernel: String,
    /// Seccomp available (prctl PR_GET_SECCOMP).
    pub seccomp: bool,
    /// Maximum supported Landlock ABI, if any.
    pub landlock_abi: Option<i32>,
    /// Running as root or holding CAP_BPF.
    pub cap_bpf: bool,
    /// Network namespaces usable (bwrap --unshare-net probe succeeded).
    pub netns: bool,
}

static FEATURES: Lazy<LinuxFeatures> = Lazy::new(probe);

/// Cached feature probe.
pub fn detect() -> &'static LinuxFeatures {
    &FEATURES
}

fn probe() -> LinuxFeatures {
    let bwrap = binary_works("bwrap", "--version");
    let features = LinuxFeatures {
        bwrap,
        socat: binary_works("socat", "-V"),
        kernel: kernel_release(),
        seccomp: seccomp_available(),
        landlock_abi: landlock_abi(),
        cap_bpf: has_cap_bpf(),
        netns: bwrap && netns_feasible(),
    };
    tracing::debug!(?features, "linux feature probe");
    features
}

fn binary_works(name: &str, version_flag: &str) -> bool {
    std::process::Command::new(name)
        .arg(version_flag)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn kernel_release() -> String {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// PR_GET_SECCOMP succeeds (returns the current mode) when the kernel has
/// seccomp; EINVAL for the current process still means the facility exists.
fn seccomp_available() -> bool {
    let ret = unsafe { libc::prctl(libc::PR_GET_SECCOMP, 0, 0, 0, 0) };
    if ret >= 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EINVAL)
}

/// landlock_create_ruleset with a null attr and the VERSION flag reports the
/// highest supported ABI.
fn landlock_abi() -> Option<i32> {
    const LANDLOCK_CREATE_RULESET_VERSION: libc::c_uint = 1;
    let ret = unsafe {
        libc::syscall(
            libc::SYS_landlock_create_ruleset,
            std::ptr::null::<libc::c_void>(),
            0usize,
            LANDLOCK_CREATE_RULESET_VERSION,
        )
    };
    if ret >= 1 {
        Some(ret as i32)
    } else {
        None
    }
}

/// Root, or CAP_BPF (bit 39) in the effective capability set.
fn has_cap_bpf() -> bool {
    if unsafe { libc::geteuid() } == 0 {
        return true;
    }
    let status = match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => status,
        Err(_) => return false,
    };
    for line in status.lines() {
        if let Some(hex) = line.strip_prefix("CapEff:") {
            if let Ok(caps) = u64::from_str_radix(hex.trim(), 16) {
                const CAP_BPF: u64 = 39;
                return (caps >> CAP_BPF) & 1 == 1;
            }
        }
    }
    false
}

/// Containers often lack CAP_NET_ADMIN; a quick probe tells us whether
/// bwrap can actually unshare the network namespace here.
fn netns_feasible() -> bool {
    std::process::Command::new("bwrap")
        .args(["--unshare-net", "--ro-bind", "/", "/", "--", "/bin/true"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Human-readable report for `--linux-features`.
pub fn report(features: &LinuxFeatures) -> String {
    let mut out = String::new();
    out.push_str(&format!("kernel:       {}\n", features.kernel));
    out.push_str(&format!("bwrap:        {}\n", yes_no(features.bwrap)));
    out.push_str(&format!("socat:        {}\n", yes_no(features.socat)));
    out.push_str(&format!("seccomp:      {}\n", yes_no(features.seccomp)));
    out.push_str(&format!(
        "landlock:     {}\n",
        match features.landlock_abi {
            Some(abi) => format!("ABI v{abi}"),
            None => "unavailable".to_string(),
        }
    ));
    out.push_str(&format!("cap_bpf:      {}\n", yes_no(features.cap_bpf)));
    out.push_str(&format!("network ns:   {}\n", yes_no(features.netns)));
    out
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
