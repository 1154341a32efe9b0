//! SOCKS5 proxy server (RFC 1928), CONNECT only.
//!
//! The policy input prefers the FQDN when the client sends one; numeric
//! addresses are passed through as written.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::FenceError;
use crate::proxy::filter::DomainFilter;
use crate::utils::debug::{is_debug_enabled, is_monitor_enabled};

const SOCKS_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REP_SUCCESS: u8 = 0x00;
const REP_GENERAL_FAILURE: u8 = 0x01;
const REP_CONNECTION_NOT_ALLOWED: u8 = 0x02;
const REP_HOST_UNREACHABLE: u8 = 0x04;
const CMD_NOT_SUPPORTED: u8 = 0x07;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// SOCKS5 proxy server bound to loopback.
pub struct Socks5Proxy {
    listener: Option<TcpListener>,
    port: u16,
    filter: Arc<DomainFilter>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Socks5Proxy {
    /// Bind to loopback. Port 0 picks an ephemeral port.
    pub async fn bind(filter: Arc<DomainFilter>, port: u16) -> Result<Self, FenceError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| FenceError::Proxy(format!("socks proxy bind failed: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| FenceError::Proxy(e.to_string()))?
            .port();

        tracing::debug!("SOCKS5 proxy listening on 127.0.0.1:{port}");

        Ok(Self {
            listener: Some(listener),
            port,
            filter,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn start(&mut self) -> Result<(), FenceError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| FenceError::Proxy("socks proxy already started".to_string()))?;
        let filter = self.filter.clone();
        let cancel = self.cancel.clone();
        let tracker = self.tracker.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                let filter = filter.clone();
                                tracker.spawn(async move {
                                    if let Err(e) = handle_client(stream, filter).await {
                                        tracing::debug!("socks5 client {addr}: {e}");
                                    }
                                });
                            }
                            Err(e) => tracing::debug!("socks5 accept error: {e}"),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Stop accepting and drain outstanding connections, bounded.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.tracker.wait()).await;
    }
}

async fn handle_client(
    mut stream: TcpStream,
    filter: Arc<DomainFilter>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Greeting: version + offered auth methods.
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err("invalid SOCKS version".into());
    }
    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&AUTH_NONE) {
        stream.write_all(&[SOCKS_VERSION, 0xFF]).await?;
        return Err("no supported auth method".into());
    }
    stream.write_all(&[SOCKS_VERSION, AUTH_NONE]).await?;

    // Request: VER CMD RSV ATYP.
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[0] != SOCKS_VERSION {
        return Err("invalid SOCKS version in request".into());
    }
    if request[1] != CMD_CONNECT {
        send_reply(&mut stream, CMD_NOT_SUPPORTED, "0.0.0.0", 0).await?;
        return Err("only CONNECT is supported".into());
    }

    let (host, port) = match request[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(&mut stream).await?;
            (std::net::Ipv4Addr::from(addr).to_string(), port)
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut domain = vec![0u8; len[0] as usize];
            stream.read_exact(&mut domain).await?;
            let port = read_port(&mut stream).await?;
            (String::from_utf8_lossy(&domain).to_string(), port)
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(&mut stream).await?;
            (std::net::Ipv6Addr::from(addr).to_string(), port)
        }
        _ => {
            send_reply(&mut stream, REP_GENERAL_FAILURE, "0.0.0.0", 0).await?;
            return Err("unsupported address type".into());
        }
    };

    if !filter.is_allowed(&host, port) {
        log_decision(&host, port, false);
        send_reply(&mut stream, REP_CONNECTION_NOT_ALLOWED, "0.0.0.0", 0).await?;
        return Ok(());
    }
    log_decision(&host, port, true);

    let target =
        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(target)) => target,
            Ok(Err(e)) => {
                tracing::debug!("socks5 dial {host}:{port}: {e}");
                send_reply(&mut stream, REP_HOST_UNREACHABLE, "0.0.0.0", 0).await?;
                return Ok(());
            }
            Err(_) => {
                send_reply(&mut stream, REP_HOST_UNREACHABLE, "0.0.0.0", 0).await?;
                return Ok(());
            }
        };

    let local_addr = target.local_addr()?;
    let (bind_addr, bind_port) = match local_addr {
        SocketAddr::V4(addr) => (addr.ip().to_string(), addr.port()),
        SocketAddr::V6(addr) => (addr.ip().to_string(), addr.port()),
    };
    send_reply(&mut stream, REP_SUCCESS, &bind_addr, bind_port).await?;

    let (mut client_read, mut client_write) = stream.into_split();
    let (mut target_read, mut target_write) = target.into_split();
    let client_to_target = tokio::io::copy(&mut client_read, &mut target_write);
    let target_to_client = tokio::io::copy(&mut target_read, &mut client_write);
    tokio::select! {
        _ = client_to_target => {}
        _ = target_to_client => {}
    }
    Ok(())
}

async fn read_port(stream: &mut TcpStream) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;
    Ok(u16::from_be_bytes(buf))
}

async fn send_reply(
    stream: &mut TcpStream,
    rep: u8,
    addr: &str,
    port: u16,
) -> Result<(), std::io::Error> {
    let mut reply = vec![SOCKS_VERSION, rep, 0x00];
    if let Ok(ipv4) = addr.parse::<std::net::Ipv4Addr>() {
        reply.push(ATYP_IPV4);
        reply.extend_from_slice(&ipv4.octets());
    } else if let Ok(ipv6) = addr.parse::<std::net::Ipv6Addr>() {
        reply.push(ATYP_IPV6);
        reply.extend_from_slice(&ipv6.octets());
    } else {
        reply.push(ATYP_DOMAIN);
        reply.push(addr.len() as u8);
        reply.extend_from_slice(addr.as_bytes());
    }
    reply.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&reply).await
}

fn log_decision(host: &str, port: u16, allowed: bool) {
    let verdict = if allowed { "allow" } else { "deny" };
    if is_monitor_enabled() && !allowed {
        tracing::info!("SOCKS5 CONNECT {host}:{port} ({verdict})");
    } else if is_debug_enabled() {
        tracing::debug!("SOCKS5 CONNECT {host}:{port} ({verdict})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    async fn start_proxy(allowed: &[&str]) -> (Socks5Proxy, u16) {
        let network = NetworkConfig {
            allowed_domains: allowed.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let filter = Arc::new(DomainFilter::from_config(Some(&network)));
        let mut proxy = Socks5Proxy::bind(filter, 0).await.unwrap();
        let port = proxy.port();
        proxy.start().unwrap();
        (proxy, port)
    }

    async fn socks_connect(port: u16, host: &str, dest_port: u16) -> u8 {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(&[SOCKS_VERSION, 1, AUTH_NONE]).await.unwrap();
        let mut auth = [0u8; 2];
        stream.read_exact(&mut auth).await.unwrap();
        assert_eq!(auth, [SOCKS_VERSION, AUTH_NONE]);

        let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0, ATYP_DOMAIN, host.len() as u8];
        request.extend_from_slice(host.as_bytes());
        request.extend_from_slice(&dest_port.to_be_bytes());
        stream.write_all(&request).await.unwrap();

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.unwrap();
        reply[1]
    }

    #[tokio::test]
    async fn denied_domain_gets_not_allowed_reply() {
        let (proxy, port) = start_proxy(&[]).await;
        let rep = socks_connect(port, "example.com", 443).await;
        assert_eq!(rep, REP_CONNECTION_NOT_ALLOWED);
        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn allowed_domain_reaches_local_listener() {
        // Spin up a local origin so the dial succeeds.
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_port = origin.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = origin.accept().await;
        });

        let (proxy, port) = start_proxy(&["localhost"]).await;
        let rep = socks_connect(port, "localhost", origin_port).await;
        assert_eq!(rep, REP_SUCCESS);
        proxy.shutdown().await;
    }
}
