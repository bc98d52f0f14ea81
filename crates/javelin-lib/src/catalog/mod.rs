//! Remote release catalog: wire types and the resolved view that joins
//! registry data with the local scan.

pub mod client;

pub use client::{CatalogClient, CatalogError};

use crate::runtime::scanner::InstalledRuntime;
use serde::{Deserialize, Serialize};

/// `GET /info/available_releases` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableReleases {
    pub available_releases: Vec<u32>,
    pub most_recent_lts: u32,
}

/// One entry of the `assets/latest/{feature}/hotspot` response. The first
/// element, if present, is authoritative.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestAsset {
    pub release_name: String,
    pub binary: AssetBinary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetBinary {
    pub package: AssetPackage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPackage {
    pub name: String,
    pub link: String,
    pub checksum: Option<String>,
    pub size: u64,
}

/// One resolvable remote artifact for the current platform. Immutable once
/// fetched; carries no local state until joined by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub feature_version: u32,
    pub release_name: String,
    pub download_url: String,
    /// Hex SHA-256 digest, when the registry published one.
    pub checksum: Option<String>,
    pub size_bytes: u64,
    pub arch: String,
    pub os: String,
}

impl RemoteRelease {
    /// File name the registry gave the artifact, derived from the link.
    pub fn artifact_file_name(&self) -> Option<String> {
        let url = url::Url::parse(&self.download_url).ok()?;
        let name = url.path_segments()?.next_back()?.to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Result of one catalog query: remote availability and the local scan in
/// a single structure, so callers need no second round trip.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCatalog {
    /// Sorted distinct feature versions the registry knows about.
    pub available: Vec<u32>,
    /// Subset of `available` at or below the registry's most recent LTS.
    pub long_term_support: Vec<u32>,
    /// Releases published for the current platform/architecture.
    pub releases: Vec<RemoteRelease>,
    /// Installations found under the configured install root.
    pub installed: Vec<InstalledRuntime>,
    /// Distinct feature versions present in `installed`.
    pub installed_versions: Vec<u32>,
}

/// Exact-match lookup by feature version. Absence of a version for the
/// current platform is common and expected, hence `Option` rather than an
/// error.
pub fn find_release(releases: &[RemoteRelease], feature_version: u32) -> Option<&RemoteRelease> {
    releases.iter().find(|r| r.feature_version == feature_version)
}
