//! Signal relay: the first SIGINT/SIGTERM is forwarded to the child, a
//! second one force-kills it. The supervisor itself keeps running so its
//! teardown happens in order.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

pub fn spawn_relay(child_pid: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("signal handler setup failed: {e}");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("signal handler setup failed: {e}");
                return;
            }
        };

        let pid = Pid::from_raw(child_pid as i32);
        let mut received = 0u32;
        loop {
            let incoming = tokio::select! {
                _ = interrupt.recv() => Signal::SIGINT,
                _ = terminate.recv() => Signal::SIGTERM,
            };
            received += 1;
            if received >= 2 {
                tracing::debug!("second signal, killing child {child_pid}");
                let _ = kill(pid, Signal::SIGKILL);
            } else {
                tracing::debug!("relaying {incoming:?} to child {child_pid}");
                let _ = kill(pid, incoming);
            }
        }
    })
}
