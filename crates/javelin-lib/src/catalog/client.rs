//! Async client for the release registry.

use super::{AvailableReleases, LatestAsset, RemoteRelease, ResolvedCatalog};
use crate::platform::PlatformProfile;
use crate::runtime::scanner;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REGISTRY_URL: &str = "https://api.adoptium.net/v3";

/// Concurrent per-version asset queries in flight at once.
const ASSET_FANOUT: usize = 4;

/// Failures that make the catalog query meaningless. Retryable by the
/// caller's policy; nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Registry returned HTTP {status} for {url}")]
    Registry {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Failed to reach the release registry: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    profile: PlatformProfile,
    install_root: PathBuf,
}

impl CatalogClient {
    pub fn new(
        profile: PlatformProfile,
        install_root: impl Into<PathBuf>,
    ) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            profile,
            install_root: install_root.into(),
        })
    }

    /// Point the client at a different registry root. Tests use this with
    /// a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Query the registry for everything it can offer this platform and
    /// join the result with the local installation scan.
    pub async fn fetch_catalog(&self) -> Result<ResolvedCatalog, CatalogError> {
        let info = self.fetch_available_releases().await?;
        log::info!(
            "Registry reports {} feature versions (most recent LTS: {})",
            info.available_releases.len(),
            info.most_recent_lts
        );

        let mut available = info.available_releases.clone();
        available.sort_unstable();
        available.dedup();

        let mut releases: Vec<RemoteRelease> = futures::stream::iter(available.iter().copied())
            .map(|feature| self.fetch_latest_binary(feature))
            .buffer_unordered(ASSET_FANOUT)
            .filter_map(|release| async move { release })
            .collect()
            .await;
        releases.sort_by_key(|r| r.feature_version);

        let long_term_support: Vec<u32> = available
            .iter()
            .copied()
            .filter(|v| *v <= info.most_recent_lts)
            .collect();

        // Everything the registry names plus anything only seen in the
        // per-version asset responses.
        let known: BTreeSet<u32> = available
            .iter()
            .copied()
            .chain(releases.iter().map(|r| r.feature_version))
            .collect();
        let installed: Vec<_> = scanner::scan(&self.profile, &self.install_root)
            .into_iter()
            .filter(|r| known.contains(&r.feature_version))
            .collect();
        let mut installed_versions: Vec<u32> =
            installed.iter().map(|r| r.feature_version).collect();
        installed_versions.sort_unstable();
        installed_versions.dedup();

        Ok(ResolvedCatalog {
            available,
            long_term_support,
            releases,
            installed,
            installed_versions,
        })
    }

    async fn fetch_available_releases(&self) -> Result<AvailableReleases, CatalogError> {
        let url = format!("{}/info/available_releases", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Registry {
                status: response.status(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    /// Fetch the latest GA binary for one feature version. A version with
    /// no published binary for this platform is expected and excluded,
    /// never an overall failure.
    async fn fetch_latest_binary(&self, feature: u32) -> Option<RemoteRelease> {
        let url = format!(
            "{}/assets/latest/{}/hotspot?os={}&architecture={}&image_type=jdk&project=jdk",
            self.base_url,
            feature,
            self.profile.registry_os(),
            self.profile.arch_token
        );
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::debug!("Asset query for JDK {} failed: {}", feature, e);
                return None;
            }
        };
        if !response.status().is_success() {
            log::debug!(
                "No JDK {} binary published for {}/{} (HTTP {})",
                feature,
                self.profile.registry_os(),
                self.profile.arch_token,
                response.status()
            );
            return None;
        }
        let assets: Vec<LatestAsset> = match response.json().await {
            Ok(assets) => assets,
            Err(e) => {
                log::debug!("Malformed asset response for JDK {}: {}", feature, e);
                return None;
            }
        };

        let asset = assets.into_iter().next()?;
        Some(RemoteRelease {
            feature_version: feature,
            release_name: asset.release_name,
            download_url: asset.binary.package.link,
            checksum: asset.binary.package.checksum,
            size_bytes: asset.binary.package.size,
            arch: self.profile.cpu_arch.to_string(),
            os: self.profile.os_name().to_string(),
        })
    }
}
