//! Utility modules.

pub mod debug;
pub mod glob;
pub mod path;
pub mod platform;
pub mod shell;

pub use debug::{init_logging, is_debug_enabled, is_monitor_enabled, FENCE_DEBUG_ENV};
pub use glob::expand_to_paths;
pub use path::{
    absolute_clean, ancestor_dirs, clean_path, contains_glob_chars, expand_home, normalize_path,
};
pub use platform::{current_platform, get_arch, Platform};
pub use shell::{basename, join_args, quote, tokenize};
