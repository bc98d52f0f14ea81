//! Local installation scanner.
//!
//! Walks an install root for runtime executables and infers installation
//! records from vendor folder-name conventions. The scan is best-effort:
//! unreadable entries are logged and skipped, and a missing root yields an
//! empty list rather than an error so callers can render "nothing found"
//! without special-casing failures.

use crate::platform::PlatformProfile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Levels walked above the executable's grandparent when the immediate
/// candidate folder carries no version token (covers nested layouts such
/// as `Contents/Home/bin`).
const MAX_ANCESTOR_WALK: usize = 3;

/// Recursion bound for the directory walk.
const MAX_SCAN_DEPTH: usize = 12;

/// One discovered local runtime installation. Identity is the canonical
/// `install_root`; records are rebuilt fresh on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRuntime {
    /// Major version, e.g. 17.
    pub feature_version: u32,
    pub folder_name: String,
    pub install_root: PathBuf,
    pub bin_dir: PathBuf,
    pub executable: PathBuf,
    pub arch: String,
    pub os: String,
    /// False for grammar-matching directories whose executable is missing;
    /// only the lenient scan reports such records.
    pub is_valid: bool,
}

struct VersionRule {
    name: &'static str,
    pattern: Regex,
}

/// Ordered folder-name grammar, first match wins. New vendor conventions
/// go at the end so existing rules keep their priority.
static VERSION_RULES: Lazy<Vec<VersionRule>> = Lazy::new(|| {
    let rule = |name, pattern: &str| VersionRule {
        name,
        pattern: Regex::new(pattern).expect("static version pattern"),
    };
    vec![
        // jdk-17.0.2+8, jdk-8u452+09, jdk8u302
        rule("jdk-prefixed", r"^jdk-?(\d+)(?:u\d+)?"),
        // 8_x86_64_windows
        rule("leading-version", r"^(\d+)_"),
        // java-11-openjdk
        rule("java-dash", r"^java-(\d+)"),
        // openjdk-17
        rule("openjdk-prefixed", r"^openjdk-(\d+)"),
        // bare "17"
        rule("bare-version", r"^(\d+)$"),
    ]
});

/// Extract the feature version from a folder name, or `None` when no rule
/// matches (such a folder is not an installation).
pub fn feature_version_of(folder_name: &str) -> Option<u32> {
    for rule in VERSION_RULES.iter() {
        if let Some(caps) = rule.pattern.captures(folder_name) {
            if let Ok(version) = caps[1].parse() {
                log::trace!("Folder {:?} matched rule {}", folder_name, rule.name);
                return Some(version);
            }
        }
    }
    None
}

fn arch_from_name(folder_name: &str, profile: &PlatformProfile) -> String {
    let lower = folder_name.to_lowercase();
    // 64-bit tokens checked first so "aarch64" is not misread as "arm".
    if lower.contains("x86_64") || lower.contains("x64") || lower.contains("amd64") {
        "x86_64"
    } else if lower.contains("aarch64") || lower.contains("arm64") {
        "aarch64"
    } else if lower.contains("x86") || lower.contains("x32") || lower.contains("i686") {
        "x86"
    } else if lower.contains("arm") {
        "arm"
    } else {
        profile.cpu_arch
    }
    .to_string()
}

fn os_from_name(folder_name: &str, profile: &PlatformProfile) -> String {
    let lower = folder_name.to_lowercase();
    // "darwin" contains "win", so the mac tokens are checked first.
    if lower.contains("mac") || lower.contains("darwin") || lower.contains("osx") {
        "mac"
    } else if lower.contains("android") || lower.contains("termux") {
        "android"
    } else if lower.contains("windows") || lower.contains("win") {
        "windows"
    } else if lower.contains("linux") {
        "linux"
    } else {
        profile.os.as_str()
    }
    .to_string()
}

fn canonical_key(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Scan `root` for valid runtime installations.
///
/// Returns one record per distinct version root, sorted by feature version
/// descending. Never errors: a missing or unreadable root yields an empty
/// list and a diagnostic.
pub fn scan(profile: &PlatformProfile, root: &Path) -> Vec<InstalledRuntime> {
    let exe_name = profile.java_executable();
    let mut executables = Vec::new();
    collect_executables(root, &exe_name, 0, &mut executables);

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut found = Vec::new();
    for exe in executables {
        if let Some(record) = record_from_executable(profile, &exe) {
            // First occurrence wins so repeat discovery paths (bin/java and
            // jre/bin/java under one root) collapse deterministically.
            if seen.insert(record.install_root.clone()) {
                found.push(record);
            }
        }
    }

    found.sort_by(|a, b| b.feature_version.cmp(&a.feature_version));
    found
}

/// Like [`scan`], but additionally reports grammar-matching directories
/// that contain no executable, flagged `is_valid = false`. Supports
/// surfacing partially installed or corrupted runtimes instead of
/// silently dropping them.
pub fn scan_lenient(profile: &PlatformProfile, root: &Path) -> Vec<InstalledRuntime> {
    let mut found = scan(profile, root);
    let mut seen: HashSet<PathBuf> = found.iter().map(|r| r.install_root.clone()).collect();

    let mut dirs = Vec::new();
    collect_version_dirs(root, 0, &mut dirs);
    for dir in dirs {
        let folder_name = match dir.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        let feature_version = match feature_version_of(&folder_name) {
            Some(v) => v,
            None => continue,
        };
        let install_root = canonical_key(&dir);
        if !seen.insert(install_root.clone()) {
            continue;
        }
        let bin_dir = install_root.join("bin");
        let executable = bin_dir.join(profile.java_executable());
        found.push(InstalledRuntime {
            feature_version,
            arch: arch_from_name(&folder_name, profile),
            os: os_from_name(&folder_name, profile),
            folder_name,
            install_root,
            bin_dir,
            executable,
            is_valid: false,
        });
    }

    found.sort_by(|a, b| b.feature_version.cmp(&a.feature_version));
    found
}

fn record_from_executable(profile: &PlatformProfile, exe: &Path) -> Option<InstalledRuntime> {
    let bin_dir = exe.parent()?.to_path_buf();
    // The grandparent of the executable is the primary version-root
    // candidate; nested vendor layouts need a few more steps up.
    let mut candidate = bin_dir.parent()?.to_path_buf();
    let mut version = candidate
        .file_name()
        .and_then(|n| feature_version_of(&n.to_string_lossy()));
    let mut walked = 0;
    while version.is_none() && walked < MAX_ANCESTOR_WALK {
        match candidate.parent() {
            Some(parent) if parent.file_name().is_some() => {
                candidate = parent.to_path_buf();
            }
            _ => break,
        }
        version = candidate
            .file_name()
            .and_then(|n| feature_version_of(&n.to_string_lossy()));
        walked += 1;
    }

    let feature_version = version?;
    let folder_name = candidate.file_name()?.to_string_lossy().into_owned();
    Some(InstalledRuntime {
        feature_version,
        arch: arch_from_name(&folder_name, profile),
        os: os_from_name(&folder_name, profile),
        folder_name,
        install_root: canonical_key(&candidate),
        bin_dir,
        executable: exe.to_path_buf(),
        is_valid: true,
    })
}

/// Collect regular files named exactly `exe_name`, skipping hidden entries.
/// Symlinked directories are not followed, which keeps the walk free of
/// cycles.
fn collect_executables(dir: &Path, exe_name: &str, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping unreadable directory {:?}: {}", dir, e);
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable entry under {:?}: {}", dir, e);
                continue;
            }
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => collect_executables(&entry.path(), exe_name, depth + 1, out),
            Ok(ft) if ft.is_file() && name == exe_name => out.push(entry.path()),
            Ok(_) => {}
            Err(e) => log::debug!("Skipping entry {:?}: {}", entry.path(), e),
        }
    }
}

fn collect_version_dirs(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping unreadable directory {:?}: {}", dir, e);
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if let Ok(ft) = entry.file_type() {
            if ft.is_dir() {
                if feature_version_of(&name).is_some() {
                    out.push(entry.path());
                }
                collect_version_dirs(&entry.path(), depth + 1, out);
            }
        }
    }
}
