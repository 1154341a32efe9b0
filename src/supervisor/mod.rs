//! Supervisor: composes policy, proxies, bridges, and the platform wrapper
//! around one child process, and tears everything down in reverse order on
//! every exit path.

pub mod env;
pub mod signals;

use std::sync::Arc;

use crate::config::FenceConfig;
use crate::error::FenceError;
use crate::policy;
use crate::proxy::{DomainFilter, HttpProxy, Socks5Proxy};
use crate::utils::{current_platform, Platform};
use crate::violation::ViolationStore;

#[cfg(target_os = "linux")]
use std::path::PathBuf;

/// One sandboxed invocation.
pub struct Supervisor {
    config: FenceConfig,
    exposed_ports: Vec<u16>,
    monitor: bool,
}

/// Everything acquired during startup, released in reverse.
#[derive(Default)]
struct Resources {
    http: Option<HttpProxy>,
    socks: Option<Socks5Proxy>,
    #[cfg(target_os = "linux")]
    outbound: Vec<crate::sandbox::linux::SocatBridge>,
    #[cfg(target_os = "linux")]
    inbound: Vec<crate::sandbox::linux::SocatBridge>,
    #[cfg(target_os = "linux")]
    bridge_dir: Option<PathBuf>,
    #[cfg(target_os = "linux")]
    seccomp: Option<crate::sandbox::linux::SeccompFilterFile>,
    #[cfg(target_os = "linux")]
    trace_monitor: Option<crate::sandbox::linux::TraceMonitor>,
    #[cfg(target_os = "macos")]
    log_monitor: Option<crate::sandbox::macos::LogMonitor>,
}

impl Resources {
    /// Reverse-order teardown: monitors, then reverse bridges, then
    /// outbound bridges, then proxies. fds close with their owners before
    /// file removal.
    async fn teardown(&mut self) {
        #[cfg(target_os = "linux")]
        {
            if let Some(ref mut monitor) = self.trace_monitor {
                monitor.stop().await;
            }
            self.trace_monitor = None;
            futures::future::join_all(self.inbound.iter_mut().map(|b| b.stop())).await;
            self.inbound.clear();
            futures::future::join_all(self.outbound.iter_mut().map(|b| b.stop())).await;
            self.outbound.clear();
        }
        #[cfg(target_os = "macos")]
        {
            if let Some(ref mut monitor) = self.log_monitor {
                monitor.stop().await;
            }
            self.log_monitor = None;
        }

        if let Some(ref proxy) = self.http {
            proxy.shutdown().await;
        }
        self.http = None;
        if let Some(ref proxy) = self.socks {
            proxy.shutdown().await;
        }
        self.socks = None;

        #[cfg(target_os = "linux")]
        {
            self.seccomp = None;
            if let Some(ref dir) = self.bridge_dir {
                let _ = std::fs::remove_dir_all(dir);
            }
            self.bridge_dir = None;
        }
    }
}

impl Supervisor {
    pub fn new(config: FenceConfig, exposed_ports: Vec<u16>, monitor: bool) -> Self {
        Self {
            config,
            exposed_ports,
            monitor,
        }
    }

    /// Run `command` confined. Returns the child's exit code.
    pub async fn run(&self, command: &str) -> Result<i32, FenceError> {
        let mut resources = Resources::default();
        let result = self.run_inner(command, &mut resources).await;
        resources.teardown().await;
        result
    }

    async fn run_inner(
        &self,
        command: &str,
        resources: &mut Resources,
    ) -> Result<i32, FenceError> {
        // Policy gate: a blocked command never spawns.
        policy::check_command(&self.config, command)?;

        let platform = current_platform().ok_or_else(|| {
            FenceError::UnsupportedPlatform("only Linux and macOS are supported".to_string())
        })?;
        crate::sandbox::check_dependencies(platform)?;

        let filter = Arc::new(DomainFilter::from_config(Some(&self.config.network)));
        let store = Arc::new(ViolationStore::new());

        // Proxies listen before anything depends on their ports.
        let mut http = HttpProxy::bind(filter.clone(), self.config.network.http_proxy_port).await?;
        http.start()?;
        let http_port = http.port();
        resources.http = Some(http);

        let mut socks =
            Socks5Proxy::bind(filter.clone(), self.config.network.socks_proxy_port).await?;
        socks.start()?;
        let socks_port = socks.port();
        resources.socks = Some(socks);

        tracing::debug!("proxies up: http={http_port} socks={socks_port}");

        let script = match platform {
            Platform::Linux => {
                self.prepare_linux(command, http_port, socks_port, resources)
                    .await?
            }
            Platform::MacOS => {
                self.prepare_macos(command, http_port, socks_port, resources, store.clone())
                    .await?
            }
        };

        let status = self.spawn_and_wait(&script, resources, store.clone()).await?;

        if self.monitor && store.count() > 0 {
            for event in store.recent(Some(20)) {
                tracing::info!("violation: {}", event.line);
            }
        }

        Ok(status)
    }

    #[cfg(target_os = "linux")]
    async fn prepare_linux(
        &self,
        command: &str,
        http_port: u16,
        socks_port: u16,
        resources: &mut Resources,
    ) -> Result<String, FenceError> {
        use crate::sandbox::linux::{self, SocatBridge, WrapperSpec};

        let features = linux::detect();
        let bridge_dir = linux::create_bridge_dir()?;
        resources.bridge_dir = Some(bridge_dir.clone());

        // Outbound bridges must have their sockets before bwrap runs.
        let http_socket = bridge_dir.join("http.sock");
        let socks_socket = bridge_dir.join("socks.sock");
        resources
            .outbound
            .push(SocatBridge::outbound(http_socket.clone(), http_port).await?);
        resources
            .outbound
            .push(SocatBridge::outbound(socks_socket.clone(), socks_port).await?);

        let mut inbound = Vec::new();
        for port in &self.exposed_ports {
            let socket = bridge_dir.join(format!("in-{port}.sock"));
            resources.inbound.push(SocatBridge::inbound(*port, &socket)?);
            inbound.push((*port, socket));
        }

        let cwd = std::env::current_dir()?;
        let spec = WrapperSpec {
            command,
            config: &self.config,
            cwd: &cwd,
            bridge_dir: &bridge_dir,
            http_socket: &http_socket,
            socks_socket: &socks_socket,
            inbound: &inbound,
        };
        let wrapped = linux::build_wrapper(&spec, features)?;
        resources.seccomp = wrapped.seccomp;
        Ok(wrapped.script)
    }

    #[cfg(not(target_os = "linux"))]
    async fn prepare_linux(
        &self,
        _command: &str,
        _http_port: u16,
        _socks_port: u16,
        _resources: &mut Resources,
    ) -> Result<String, FenceError> {
        Err(FenceError::UnsupportedPlatform(
            "Linux sandbox support not compiled in".to_string(),
        ))
    }

    #[cfg(target_os = "macos")]
    async fn prepare_macos(
        &self,
        command: &str,
        http_port: u16,
        socks_port: u16,
        resources: &mut Resources,
        store: Arc<ViolationStore>,
    ) -> Result<String, FenceError> {
        use crate::sandbox::macos::{self, LogMonitor};

        std::fs::create_dir_all(macos::SANDBOX_TMPDIR)?;
        let wrapped = macos::build_wrapper(command, &self.config, http_port, socks_port)?;

        if self.monitor {
            match LogMonitor::start(wrapped.log_tag.clone(), store).await {
                Ok(monitor) => resources.log_monitor = Some(monitor),
                Err(e) => tracing::debug!("log monitor unavailable: {e}"),
            }
        }
        Ok(wrapped.script)
    }

    #[cfg(not(target_os = "macos"))]
    async fn prepare_macos(
        &self,
        _command: &str,
        _http_port: u16,
        _socks_port: u16,
        _resources: &mut Resources,
        _store: Arc<ViolationStore>,
    ) -> Result<String, FenceError> {
        Err(FenceError::UnsupportedPlatform(
            "macOS sandbox support not compiled in".to_string(),
        ))
    }

    async fn spawn_and_wait(
        &self,
        script: &str,
        resources: &mut Resources,
        store: Arc<ViolationStore>,
    ) -> Result<i32, FenceError> {
        let mut command = tokio::process::Command::new("/bin/sh");
        command.arg("-c").arg(script);
        command.env_clear();
        command.envs(env::hardened_env());

        #[cfg(target_os = "linux")]
        {
            // The Landlock wrapper re-reads the resolved policy from the
            // environment inside the sandbox.
            let config_json = serde_json::to_string(&self.config)
                .map_err(|e| FenceError::Setup(format!("config marshal: {e}")))?;
            command.env(crate::sandbox::linux::CONFIG_ENV, config_json);
        }

        let mut child = command
            .spawn()
            .map_err(|e| FenceError::ExecutionFailed(format!("failed to spawn child: {e}")))?;

        let relay = child.id().map(signals::spawn_relay);

        #[cfg(target_os = "linux")]
        if self.monitor {
            resources.trace_monitor =
                crate::sandbox::linux::TraceMonitor::start(store.clone()).await;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = (&resources, &store);

        let status = child.wait().await;
        if let Some(relay) = relay {
            relay.abort();
        }

        let status = status
            .map_err(|e| FenceError::ExecutionFailed(format!("waiting for child: {e}")))?;
        Ok(exit_code(status))
    }
}

/// The child's exit code; signal terminations map to 128 + signo.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
