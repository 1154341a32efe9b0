//! Logging setup and global debug/monitor flags.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static MONITOR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Environment variable that forces debug logging.
pub const FENCE_DEBUG_ENV: &str = "FENCE_DEBUG";

/// Initialize tracing. Debug mode comes from the flag or `FENCE_DEBUG`;
/// monitor mode raises proxy decision lines to info level.
pub fn init_logging(debug: bool, monitor: bool) {
    let debug_enabled = debug || std::env::var(FENCE_DEBUG_ENV).is_ok();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);
    MONITOR_ENABLED.store(monitor, Ordering::SeqCst);

    let filter = if debug_enabled {
        EnvFilter::new("fence=debug,warn")
    } else {
        EnvFilter::new("fence=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(debug_enabled)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .try_init()
        .ok();
}

pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

pub fn is_monitor_enabled() -> bool {
    MONITOR_ENABLED.load(Ordering::SeqCst)
}
