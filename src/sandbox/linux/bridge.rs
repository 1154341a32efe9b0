//! socat bridges between the sandbox's Unix sockets and host TCP ports.
//!
//! Outbound: the sandbox sees only a Unix socket per proxy; a host-side
//! socat relays it to the TCP-bound proxy, which lives in the host network
//! namespace. Inbound: for each user-exposed port a host-side socat listens
//! on TCP and relays into a Unix socket served from inside the sandbox.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::error::FenceError;

/// How long to wait for a bridge socket file to appear.
const SOCKET_WAIT: Duration = Duration::from_secs(5);
const SOCKET_POLL: Duration = Duration::from_millis(100);

/// A running socat relay process.
pub struct SocatBridge {
    child: Option<Child>,
    socket_path: Option<PathBuf>,
}

impl SocatBridge {
    /// Host side of the outbound path: listen on a Unix socket, forward
    /// each connection to a local TCP port. Waits for the socket file.
    pub async fn outbound(socket_path: PathBuf, tcp_port: u16) -> Result<Self, FenceError> {
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let child = spawn_socat(&[
            &format!("UNIX-LISTEN:{},fork,reuseaddr", socket_path.display()),
            &format!("TCP:localhost:{tcp_port}"),
        ])?;

        let bridge = Self {
            child: Some(child),
            socket_path: Some(socket_path.clone()),
        };

        let deadline = tokio::time::Instant::now() + SOCKET_WAIT;
        while !socket_path.exists() {
            if tokio::time::Instant::now() >= deadline {
                return Err(FenceError::Setup(format!(
                    "bridge socket {} did not appear within {:?}",
                    socket_path.display(),
                    SOCKET_WAIT
                )));
            }
            tokio::time::sleep(SOCKET_POLL).await;
        }
        Ok(bridge)
    }

    /// Host side of the inbound path: listen on a TCP port, forward into a
    /// Unix socket that the sandboxed process serves. socat retries until
    /// the in-sandbox listener comes up.
    pub fn inbound(tcp_port: u16, socket_path: &Path) -> Result<Self, FenceError> {
        let child = spawn_socat(&[
            &format!("TCP-LISTEN:{tcp_port},fork,reuseaddr"),
            &format!(
                "UNIX-CONNECT:{},retry=50,interval=0.1",
                socket_path.display()
            ),
        ])?;
        Ok(Self {
            child: Some(child),
            socket_path: None,
        })
    }

    /// The socat stanza run inside the sandbox that exposes a host proxy on
    /// a local TCP port.
    pub fn inner_proxy_listener(tcp_port: u16, socket_path: &str) -> String {
        format!("socat TCP-LISTEN:{tcp_port},fork,reuseaddr UNIX-CONNECT:{socket_path}")
    }

    /// The socat stanza run inside the sandbox that serves an exposed port's
    /// Unix socket by connecting back to the in-sandbox listener.
    pub fn inner_inbound_listener(tcp_port: u16, socket_path: &str) -> String {
        format!("socat UNIX-LISTEN:{socket_path},fork TCP:127.0.0.1:{tcp_port}")
    }

    pub fn socket_path(&self) -> Option<&PathBuf> {
        self.socket_path.as_ref()
    }

    pub async fn stop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.kill().await;
        }
        self.child = None;
        if let Some(ref path) = self.socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for SocatBridge {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
        if let Some(ref path) = self.socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn spawn_socat(args: &[&str]) -> Result<Child, FenceError> {
    Command::new("socat")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FenceError::MissingDependency(
                    "socat is required for network bridging".to_string(),
                )
            } else {
                FenceError::Io(e)
            }
        })
}

/// A fresh socket path under /tmp, randomized per invocation.
pub fn generate_socket_path(prefix: &str) -> PathBuf {
    use rand::Rng;
    let suffix: u32 = rand::thread_rng().gen();
    PathBuf::from(format!(
        "/tmp/fence-{prefix}-{}-{suffix:08x}.sock",
        std::process::id()
    ))
}

/// Create the per-invocation bridge directory. It is bind-mounted into the
/// sandbox so socket files created on either side are visible to both.
pub fn create_bridge_dir() -> Result<PathBuf, FenceError> {
    use rand::Rng;
    use std::os::unix::fs::DirBuilderExt;

    let suffix: u32 = rand::thread_rng().gen();
    let dir = PathBuf::from(format!(
        "/tmp/fence-bridge-{}-{suffix:08x}",
        std::process::id()
    ));
    std::fs::DirBuilder::new().mode(0o700).create(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_paths_are_unique_and_in_tmp() {
        let a = generate_socket_path("http");
        let b = generate_socket_path("http");
        assert_ne!(a, b);
        assert!(a.to_string_lossy().starts_with("/tmp/fence-http-"));
        assert!(a.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn inner_listener_stanzas() {
        assert_eq!(
            SocatBridge::inner_proxy_listener(3128, "/tmp/h.sock"),
            "socat TCP-LISTEN:3128,fork,reuseaddr UNIX-CONNECT:/tmp/h.sock"
        );
        assert_eq!(
            SocatBridge::inner_inbound_listener(8000, "/tmp/in.sock"),
            "socat UNIX-LISTEN:/tmp/in.sock,fork TCP:127.0.0.1:8000"
        );
    }
}
