use serde::{Deserialize, Serialize};
use std::env;

/// The host has no mapping entry; nothing downstream can work, so this is
/// surfaced immediately and never retried.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Unsupported CPU architecture: {0}")]
    UnsupportedArch(String),
}

/// Operating system families the runtime registry and the on-disk
/// heuristics know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    Mac,
    Android,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Mac => "mac",
            OsFamily::Android => "android",
        }
    }
}

/// Platform facts every other component keys off: one profile is resolved
/// per run and passed explicitly so tests can substitute any platform
/// without touching real host state.
///
/// `arch_token` and `cpu_arch` are deliberately separate vocabularies.
/// The registry's query parameter and vendor folder names spell the same
/// silicon differently (`x64` vs `x86_64`), and the two are allowed to
/// diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub os: OsFamily,
    /// Architecture id in the registry's vocabulary (`x64`, `aarch64`, ...).
    pub arch_token: &'static str,
    /// Architecture id in the on-disk folder-name vocabulary (`x86_64`, ...).
    pub cpu_arch: &'static str,
    /// Archive format the registry publishes for this OS.
    pub archive_ext: &'static str,
    /// Suffix of the runtime executable (`.exe` on Windows, empty elsewhere).
    pub exe_suffix: &'static str,
}

impl PlatformProfile {
    /// Resolve the profile for the current host.
    pub fn resolve() -> Result<Self, PlatformError> {
        let os = match env::consts::OS {
            "windows" => OsFamily::Windows,
            "macos" => OsFamily::Mac,
            "android" => OsFamily::Android,
            // Termux reports itself as linux but runs on Android proper.
            "linux" if env::var_os("TERMUX_VERSION").is_some() => OsFamily::Android,
            "linux" => OsFamily::Linux,
            other => return Err(PlatformError::UnsupportedOs(other.to_string())),
        };
        Self::for_target(os, env::consts::ARCH)
    }

    /// Build a profile for an explicit os/arch pair. Backs the
    /// platform-override configuration inputs and lets tests exercise
    /// cross-platform resolution without a matching host.
    pub fn for_target(os: OsFamily, target_arch: &str) -> Result<Self, PlatformError> {
        let (archive_ext, exe_suffix) = match os {
            OsFamily::Windows => ("zip", ".exe"),
            _ => ("tar.gz", ""),
        };
        Ok(Self {
            os,
            arch_token: registry_arch_token(target_arch)?,
            cpu_arch: disk_arch_token(target_arch)?,
            archive_ext,
            exe_suffix,
        })
    }

    pub fn os_name(&self) -> &'static str {
        self.os.as_str()
    }

    /// OS token used when querying the registry. The registry has no
    /// android channel; Termux consumes linux builds.
    pub fn registry_os(&self) -> &'static str {
        match self.os {
            OsFamily::Windows => "windows",
            OsFamily::Mac => "mac",
            OsFamily::Linux | OsFamily::Android => "linux",
        }
    }

    /// File name of the runtime executable on this platform.
    pub fn java_executable(&self) -> String {
        format!("java{}", self.exe_suffix)
    }
}

/// Vocabulary of the registry's `architecture` query parameter.
fn registry_arch_token(target_arch: &str) -> Result<&'static str, PlatformError> {
    match target_arch {
        "x86_64" | "amd64" | "x64" => Ok("x64"),
        "x86" | "i586" | "i686" => Ok("x86"),
        "aarch64" | "arm64" => Ok("aarch64"),
        "arm" | "armv7" | "armv7l" => Ok("arm"),
        other => Err(PlatformError::UnsupportedArch(other.to_string())),
    }
}

/// Vocabulary used by vendor folder names on disk.
fn disk_arch_token(target_arch: &str) -> Result<&'static str, PlatformError> {
    match target_arch {
        "x86_64" | "amd64" | "x64" => Ok("x86_64"),
        "x86" | "i586" | "i686" => Ok("x86"),
        "aarch64" | "arm64" => Ok("aarch64"),
        "arm" | "armv7" | "armv7l" => Ok("arm"),
        other => Err(PlatformError::UnsupportedArch(other.to_string())),
    }
}
