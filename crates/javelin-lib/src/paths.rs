//! Filesystem layout configuration.

use std::path::{Path, PathBuf};

/// Where downloaded archives and unpacked runtimes live. The download
/// root is flat (one archive per acquisition); the unpack root holds one
/// subdirectory per installed feature version with the vendor-internal
/// structure preserved verbatim.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    data_dir: PathBuf,
    download_root: Option<PathBuf>,
    unpack_root: Option<PathBuf>,
}

impl RuntimePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            download_root: None,
            unpack_root: None,
        }
    }

    /// Default working directory under the system temp dir.
    pub fn default_temp() -> Self {
        Self::new(std::env::temp_dir().join("javelin"))
    }

    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = Some(root.into());
        self
    }

    pub fn with_unpack_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.unpack_root = Some(root.into());
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn download_root(&self) -> PathBuf {
        self.download_root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("downloads"))
    }

    pub fn unpack_root(&self) -> PathBuf {
        self.unpack_root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("runtimes"))
    }

    /// Extraction destination for one feature version.
    pub fn runtime_dir(&self, feature_version: u32) -> PathBuf {
        self.unpack_root().join(format!("jdk-{}", feature_version))
    }

    /// Download destination for one artifact.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.download_root().join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_roots_from_data_dir() {
        let paths = RuntimePaths::new("/data/javelin");
        assert_eq!(paths.download_root(), PathBuf::from("/data/javelin/downloads"));
        assert_eq!(paths.unpack_root(), PathBuf::from("/data/javelin/runtimes"));
        assert_eq!(
            paths.runtime_dir(17),
            PathBuf::from("/data/javelin/runtimes/jdk-17")
        );
        assert_eq!(
            paths.artifact_path("jdk.tar.gz"),
            PathBuf::from("/data/javelin/downloads/jdk.tar.gz")
        );
    }

    #[test]
    fn roots_are_overridable() {
        let paths = RuntimePaths::new("/data/javelin")
            .with_download_root("/cache/dl")
            .with_unpack_root("/opt/jvm");
        assert_eq!(paths.download_root(), PathBuf::from("/cache/dl"));
        assert_eq!(paths.runtime_dir(21), PathBuf::from("/opt/jvm/jdk-21"));
    }
}
