//! Probes a runtime executable by running `java -version`.
//!
//! The scanner infers versions from folder names; probing asks the binary
//! itself, which is the authoritative check after unpacking a fresh
//! download.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information reported by a probed executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedJava {
    pub path: PathBuf,
    pub major_version: u32,
    pub is_64bit: bool,
}

/// Locate a `java` executable on PATH, if any.
pub fn find_on_path() -> Option<PathBuf> {
    which::which("java").ok()
}

/// Run `java -version` and parse the result.
pub fn verify_java(path: &Path) -> Result<DetectedJava> {
    if !path.exists() {
        anyhow::bail!("Java executable does not exist: {:?}", path);
    }

    // java -version writes to stderr.
    let output = Command::new(path)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to run {:?} -version", path))?;
    let version_output = String::from_utf8_lossy(&output.stderr);

    let major_version = parse_major_version(&version_output)
        .with_context(|| format!("Could not parse Java version from: {}", version_output))?;
    let is_64bit = version_output.contains("64-Bit")
        || version_output.contains("x86_64")
        || version_output.contains("amd64")
        || version_output.contains("aarch64");

    Ok(DetectedJava {
        path: path.to_path_buf(),
        major_version,
        is_64bit,
    })
}

static VERSION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version\s+"?(\d+)(?:\.(\d+))?"#).expect("static version pattern"));

/// Parse the major version out of `java -version` output, mapping the
/// legacy `1.8.x` scheme to 8.
pub fn parse_major_version(version_output: &str) -> Option<u32> {
    let caps = VERSION_LINE.captures(version_output)?;
    let major: u32 = caps.get(1)?.as_str().parse().ok()?;
    if major == 1 {
        return caps.get(2)?.as_str().parse().ok();
    }
    Some(major)
}
