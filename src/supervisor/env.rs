//! Environment hardening for the child process.

/// Variables always removed, beyond the `LD_`/`DYLD_` prefix sweep.
const STRIPPED_KEYS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_DEBUG",
    "LD_DEBUG_OUTPUT",
    "LD_DYNAMIC_WEAK",
    "LD_ORIGIN_PATH",
    "LD_PROFILE",
    "LD_PROFILE_OUTPUT",
    "LD_SHOW_AUXV",
    "LD_TRACE_LOADED_OBJECTS",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_IMAGE_SUFFIX",
    "DYLD_FORCE_FLAT_NAMESPACE",
];

/// Prefixes removed wholesale: library-injection knobs in either loader.
const STRIPPED_PREFIXES: &[&str] = &["LD_", "DYLD_FALLBACK_", "DYLD_PRINT_", "DYLD_"];

/// The current environment minus loader-injection variables.
pub fn hardened_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(key, _)| !is_stripped(key))
        .collect()
}

fn is_stripped(key: &str) -> bool {
    STRIPPED_KEYS.contains(&key)
        || STRIPPED_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_injection_keys_are_stripped() {
        for key in [
            "LD_PRELOAD",
            "LD_LIBRARY_PATH",
            "LD_ANYTHING_ELSE",
            "DYLD_INSERT_LIBRARIES",
            "DYLD_FALLBACK_LIBRARY_PATH",
            "DYLD_PRINT_LIBRARIES",
        ] {
            assert!(is_stripped(key), "{key} should be stripped");
        }
    }

    #[test]
    fn ordinary_keys_survive() {
        for key in ["PATH", "HOME", "LANG", "TERM", "OLDPWD", "LDFLAGS"] {
            assert!(!is_stripped(key), "{key} should survive");
        }
    }

    #[test]
    fn hardened_env_matches_filter() {
        std::env::set_var("LD_PRELOAD", "/tmp/evil.so");
        std::env::set_var("FENCE_TEST_KEEP", "1");
        let env = hardened_env();
        assert!(!env.iter().any(|(k, _)| k == "LD_PRELOAD"));
        assert!(env.iter().any(|(k, _)| k == "FENCE_TEST_KEEP"));
        std::env::remove_var("LD_PRELOAD");
        std::env::remove_var("FENCE_TEST_KEEP");
    }
}
