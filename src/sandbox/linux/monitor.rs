//! Best-effort eBPF violation observer.
//!
//! When bpftrace is installed and the process holds CAP_BPF (or runs as
//! root), a small probe prints one `DENIED:` line per EPERM-rejected
//! dangerous syscall. The wire format is only consumed by humans; every
//! failure path degrades to a debug log and the sandbox carries on.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::sandbox::linux::features;
use crate::violation::{ViolationEvent, ViolationSource, ViolationStore};

/// Syscall exits watched for EPERM denials.
const PROBE_PROGRAM: &str = r#"
tracepoint:syscalls:sys_exit_ptrace,
tracepoint:syscalls:sys_exit_bpf,
tracepoint:syscalls:sys_exit_mount,
tracepoint:syscalls:sys_exit_init_module,
tracepoint:syscalls:sys_exit_reboot
/args->ret == -1/
{
    printf("DENIED: syscall pid=%d comm=%s probe=%s\n", pid, comm, probe);
}
"#;

/// A running bpftrace observer.
pub struct TraceMonitor {
    child: Option<Child>,
}

impl TraceMonitor {
    /// Start the observer if the environment permits. `None` means the
    /// capability or binary is missing; that is not an error.
    pub async fn start(store: Arc<ViolationStore>) -> Option<Self> {
        if !features::detect().cap_bpf {
            tracing::debug!("trace monitor skipped: no CAP_BPF");
            return None;
        }
        match spawn_probe(store).await {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                tracing::debug!("trace monitor unavailable: {e}");
                None
            }
        }
    }

    pub async fn stop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.kill().await;
        }
        self.child = None;
    }
}

impl Drop for TraceMonitor {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

async fn spawn_probe(store: Arc<ViolationStore>) -> Result<TraceMonitor> {
    let mut child = Command::new("bpftrace")
        .args(["-e", PROBE_PROGRAM])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("spawning bpftrace")?;

    let stdout = child.stdout.take().context("bpftrace stdout missing")?;
    tokio::spawn(async move {
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.starts_with("DENIED:") {
                store.add(ViolationEvent::new(line, ViolationSource::LinuxTrace));
            }
        }
    });

    Ok(TraceMonitor { child: Some(child) })
}
