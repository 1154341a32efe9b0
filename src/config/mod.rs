//! Configuration model: schema, pattern matching, merge, loading, templates.

pub mod loader;
pub mod merge;
pub mod pattern;
pub mod schema;
pub mod templates;

pub use loader::{default_settings_path, load_default, load_file, load_template, parse_config};
pub use merge::{merge, MAX_INHERITANCE_DEPTH};
pub use pattern::{matches_domain, matches_host};
pub use schema::{
    validate_domain, validate_host_pattern, CommandConfig, FenceConfig, FilesystemConfig,
    NetworkConfig, SshConfig, DANGEROUS_DIRECTORIES, DANGEROUS_FILES, GIT_CONFIG_FILE,
    GIT_HOOKS_DIR,
};
