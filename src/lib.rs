//! fence - per-command sandboxing for Linux and macOS.
//!
//! Confines a child process without a container runtime:
//! - Linux: bubblewrap namespaces + seccomp + Landlock, with socat bridges
//!   routing traffic through local filtering proxies
//! - macOS: a generated sandbox-exec profile with the same proxy routing
//!
//! Policy covers outbound domains, filesystem reads/writes, and the command
//! string itself (including shell chains and SSH remote commands).

pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod proxy;
pub mod sandbox;
pub mod supervisor;
pub mod utils;
pub mod violation;

pub use config::FenceConfig;
pub use error::{BlockOrigin, ConfigError, FenceError, PolicyBlock, Result};
pub use supervisor::Supervisor;
pub use violation::{ViolationEvent, ViolationStore};

/// Commonly used items.
pub mod prelude {
    pub use crate::config::FenceConfig;
    pub use crate::error::{FenceError, PolicyBlock, Result};
    pub use crate::supervisor::Supervisor;
}
