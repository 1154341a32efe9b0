//! Platform-specific confinement.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

use crate::error::FenceError;
use crate::utils::Platform;

/// Verify the external tools the platform confinement relies on.
pub fn check_dependencies(platform: Platform) -> Result<(), FenceError> {
    match platform {
        Platform::MacOS => {
            // sandbox-exec ships with macOS.
            Ok(())
        }
        Platform::Linux => {
            #[cfg(target_os = "linux")]
            {
                let features = linux::detect();
                if !features.bwrap {
                    return Err(FenceError::MissingDependency(
                        "bubblewrap (bwrap) is required for Linux sandboxing".to_string(),
                    ));
                }
                if !features.socat {
                    return Err(FenceError::MissingDependency(
                        "socat is required for Linux network bridging".to_string(),
                    ));
                }
                Ok(())
            }
            #[cfg(not(target_os = "linux"))]
            {
                Err(FenceError::UnsupportedPlatform(
                    "Linux sandbox support not compiled in".to_string(),
                ))
            }
        }
    }
}
