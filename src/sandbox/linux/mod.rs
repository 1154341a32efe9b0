//! Linux confinement: bubblewrap + seccomp + Landlock + socat bridges.

pub mod bridge;
pub mod bwrap;
pub mod features;
pub mod filesystem;
pub mod landlock;
pub mod monitor;
pub mod seccomp;

pub use bridge::{create_bridge_dir, generate_socket_path, SocatBridge};
pub use bwrap::{build_wrapper, LinuxCommand, WrapperSpec, INNER_HTTP_PORT, INNER_SOCKS_PORT};
pub use features::{detect, LinuxFeatures};
pub use landlock::{run_apply, wrapper_available, CONFIG_ENV};
pub use monitor::TraceMonitor;
pub use seccomp::SeccompFilterFile;
