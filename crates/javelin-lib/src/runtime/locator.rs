//! Cross-references a requested feature version against the local scan.

use super::scanner::{scan_lenient, InstalledRuntime};
use crate::platform::PlatformProfile;
use std::path::Path;

/// Filters applied on top of the mandatory feature-version match. Each is
/// independently toggleable; everything defaults to off.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocateOptions {
    pub require_valid: bool,
    pub require_same_arch: bool,
    pub require_same_os: bool,
}

impl LocateOptions {
    /// The usual "can I launch with this" combination.
    pub fn strict() -> Self {
        Self {
            require_valid: true,
            require_same_arch: true,
            require_same_os: true,
        }
    }
}

/// Find an installation of `feature_version` under `root`, or `None` when
/// absent. Absence is an expected outcome, not an error.
pub fn find_local(
    profile: &PlatformProfile,
    root: &Path,
    feature_version: u32,
    options: &LocateOptions,
) -> Option<InstalledRuntime> {
    scan_lenient(profile, root).into_iter().find(|runtime| {
        if runtime.feature_version != feature_version {
            return false;
        }
        if options.require_valid && !runtime.is_valid {
            return false;
        }
        if options.require_same_arch && runtime.arch != profile.cpu_arch {
            return false;
        }
        if options.require_same_os && runtime.os != profile.os.as_str() {
            return false;
        }
        true
    })
}
