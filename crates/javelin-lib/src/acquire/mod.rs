//! Acquisition pipeline: download a selected release, verify the artifact
//! against the size and checksum the registry published, and unpack it
//! into the runtime root.
//!
//! Extraction is never attempted before verification passes, and a
//! rejected artifact is deleted before the outcome resolves, so a
//! concurrent re-scan can never mistake a corrupt download for an
//! installation.

pub mod jobs;

pub use jobs::{JobError, JobEvent, JobHandle, JobId, JobKind, JobRunner, TokioJobRunner};

use crate::catalog::RemoteRelease;
use crate::paths::RuntimePaths;
use crate::platform::PlatformProfile;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("Transfer job failed: {0}")]
    Job(#[from] JobError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why verification rejected an artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Verdict of the post-download integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(IntegrityError),
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

/// Result of one download + verify + unpack cycle.
#[derive(Debug)]
pub struct AcquisitionOutcome {
    pub release: RemoteRelease,
    pub artifact: PathBuf,
    pub verdict: Verdict,
    /// Extraction destination; set only when verification passed.
    pub unpacked_to: Option<PathBuf>,
}

/// Check a downloaded artifact against the expected size and checksum.
///
/// The size is compared first so a truncated download is rejected without
/// hashing it; the checksum (when present) is recomputed with SHA-256 and
/// compared case-insensitively. A rejected artifact is deleted before the
/// verdict is returned.
pub async fn verify_artifact(
    path: &Path,
    expected_size: u64,
    expected_checksum: Option<&str>,
) -> Result<Verdict, AcquireError> {
    let actual_size = tokio::fs::metadata(path).await?.len();
    if actual_size != expected_size {
        let error = IntegrityError::SizeMismatch {
            expected: expected_size,
            actual: actual_size,
        };
        discard(path, &error).await;
        return Ok(Verdict::Failed(error));
    }

    if let Some(expected) = expected_checksum {
        let actual = sha256_of(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            let error = IntegrityError::ChecksumMismatch {
                expected: expected.to_lowercase(),
                actual,
            };
            discard(path, &error).await;
            return Ok(Verdict::Failed(error));
        }
    }

    Ok(Verdict::Passed)
}

async fn sha256_of(path: &Path) -> Result<String, AcquireError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

async fn discard(path: &Path, reason: &IntegrityError) {
    log::warn!("Deleting corrupt artifact {:?}: {}", path, reason);
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to delete corrupt artifact {:?}: {}", path, e);
    }
}

/// Orchestrates one acquisition at a time through the job runner.
pub struct Acquirer<R: JobRunner> {
    runner: R,
    profile: PlatformProfile,
    paths: RuntimePaths,
}

impl<R: JobRunner> Acquirer<R> {
    pub fn new(runner: R, profile: PlatformProfile, paths: RuntimePaths) -> Self {
        Self {
            runner,
            profile,
            paths,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Download, verify and unpack one release, storing the archive as
    /// `file_name` in the download root.
    pub async fn acquire(
        &self,
        release: &RemoteRelease,
        file_name: &str,
    ) -> Result<AcquisitionOutcome, AcquireError> {
        let artifact = self.paths.artifact_path(file_name);
        log::info!(
            "Acquiring JDK {}: {} -> {:?}",
            release.feature_version,
            release.download_url,
            artifact
        );

        let handle = self.runner.download(&release.download_url, &artifact);
        if let Err(e) = handle.wait().await {
            // A failed or cancelled transfer must not leave anything behind.
            let _ = tokio::fs::remove_file(&artifact).await;
            return Err(AcquireError::Job(e));
        }

        let verdict =
            verify_artifact(&artifact, release.size_bytes, release.checksum.as_deref()).await?;
        if let Verdict::Failed(reason) = &verdict {
            log::warn!(
                "JDK {} artifact rejected: {}",
                release.feature_version,
                reason
            );
            return Ok(AcquisitionOutcome {
                release: release.clone(),
                artifact,
                verdict,
                unpacked_to: None,
            });
        }

        let dest = self.paths.runtime_dir(release.feature_version);
        log::info!("Unpacking {:?} -> {:?}", artifact, dest);
        let handle = self.runner.unpack(&artifact, &dest);
        handle.wait().await?;

        #[cfg(unix)]
        self.restore_executable_bits(&dest);

        Ok(AcquisitionOutcome {
            release: release.clone(),
            artifact,
            verdict: Verdict::Passed,
            unpacked_to: Some(dest),
        })
    }

    /// Like [`Self::acquire`], deriving the artifact file name from the
    /// release's download link.
    pub async fn acquire_release(
        &self,
        release: &RemoteRelease,
    ) -> Result<AcquisitionOutcome, AcquireError> {
        let file_name = release.artifact_file_name().unwrap_or_else(|| {
            format!(
                "jdk-{}.{}",
                release.feature_version, self.profile.archive_ext
            )
        });
        self.acquire(release, &file_name).await
    }

    /// Vendor archives do not always survive extraction with their modes
    /// intact; make sure the runtime executables are runnable.
    #[cfg(unix)]
    fn restore_executable_bits(&self, dest: &Path) {
        use std::os::unix::fs::PermissionsExt;
        for runtime in crate::runtime::scanner::scan(&self.profile, dest) {
            match std::fs::metadata(&runtime.executable) {
                Ok(metadata) => {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o755);
                    if let Err(e) = std::fs::set_permissions(&runtime.executable, perms) {
                        log::warn!(
                            "Failed to mark {:?} executable: {}",
                            runtime.executable,
                            e
                        );
                    }
                }
                Err(e) => log::warn!("Failed to stat {:?}: {}", runtime.executable, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::OsFamily;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn checksum_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[tokio::test]
    async fn verify_accepts_matching_artifact() {
        let tmp = tempdir().unwrap();
        let artifact = tmp.path().join("jdk.tar.gz");
        let data = b"archive-bytes";
        tokio::fs::write(&artifact, data).await.unwrap();

        let verdict = verify_artifact(&artifact, data.len() as u64, Some(&checksum_hex(data)))
            .await
            .unwrap();
        assert!(verdict.passed());
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn verify_accepts_uppercase_checksum() {
        let tmp = tempdir().unwrap();
        let artifact = tmp.path().join("jdk.tar.gz");
        let data = b"archive-bytes";
        tokio::fs::write(&artifact, data).await.unwrap();

        let upper = checksum_hex(data).to_uppercase();
        let verdict = verify_artifact(&artifact, data.len() as u64, Some(&upper))
            .await
            .unwrap();
        assert!(verdict.passed());
    }

    #[tokio::test]
    async fn verify_rejects_and_deletes_on_size_mismatch() {
        let tmp = tempdir().unwrap();
        let artifact = tmp.path().join("jdk.tar.gz");
        let data = b"archive-bytes";
        tokio::fs::write(&artifact, data).await.unwrap();

        // Wrong size short-circuits before any hashing happens.
        let verdict = verify_artifact(&artifact, data.len() as u64 + 1, Some("unhashable"))
            .await
            .unwrap();
        match verdict {
            Verdict::Failed(IntegrityError::SizeMismatch { expected, actual }) => {
                assert_eq!(expected, data.len() as u64 + 1);
                assert_eq!(actual, data.len() as u64);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn verify_rejects_and_deletes_on_checksum_mismatch() {
        let tmp = tempdir().unwrap();
        let artifact = tmp.path().join("jdk.tar.gz");
        let mut data = b"archive-bytes".to_vec();
        let good = checksum_hex(&data);
        // One flipped byte must flip the verdict.
        data[0] ^= 0xff;
        tokio::fs::write(&artifact, &data).await.unwrap();

        let verdict = verify_artifact(&artifact, data.len() as u64, Some(&good))
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            Verdict::Failed(IntegrityError::ChecksumMismatch { .. })
        ));
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn verify_without_checksum_only_checks_size() {
        let tmp = tempdir().unwrap();
        let artifact = tmp.path().join("jdk.tar.gz");
        let data = b"archive-bytes";
        tokio::fs::write(&artifact, data).await.unwrap();

        let verdict = verify_artifact(&artifact, data.len() as u64, None)
            .await
            .unwrap();
        assert!(verdict.passed());
    }

    /// Job runner that writes canned bytes instead of touching the
    /// network, recording the order of submitted jobs.
    struct ScriptedRunner {
        payload: Vec<u8>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedRunner {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                payload,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn complete(result: Result<(), JobError>) -> JobHandle {
            let (tx, rx) = tokio::sync::oneshot::channel();
            tx.send(result).ok();
            JobHandle::new(uuid::Uuid::new_v4(), rx)
        }
    }

    impl JobRunner for ScriptedRunner {
        fn download(&self, _url: &str, dest: &Path) -> JobHandle {
            self.calls.lock().unwrap().push("download");
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::write(dest, &self.payload).unwrap();
            Self::complete(Ok(()))
        }

        fn unpack(&self, _archive: &Path, dest: &Path) -> JobHandle {
            self.calls.lock().unwrap().push("unpack");
            std::fs::create_dir_all(dest).unwrap();
            Self::complete(Ok(()))
        }

        fn cancel(&self, _id: JobId) {}

        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
            tokio::sync::broadcast::channel(1).1
        }
    }

    fn release_for(data: &[u8], checksum: Option<String>) -> RemoteRelease {
        RemoteRelease {
            feature_version: 17,
            release_name: "jdk-17.0.2+8".to_string(),
            download_url: "https://example.invalid/jdk-17.tar.gz".to_string(),
            checksum,
            size_bytes: data.len() as u64,
            arch: "x86_64".to_string(),
            os: "linux".to_string(),
        }
    }

    fn profile() -> PlatformProfile {
        PlatformProfile::for_target(OsFamily::Linux, "x86_64").unwrap()
    }

    #[tokio::test]
    async fn acquire_downloads_verifies_then_unpacks() {
        let tmp = tempdir().unwrap();
        let data = b"archive-bytes".to_vec();
        let release = release_for(&data, Some(checksum_hex(&data)));
        let acquirer = Acquirer::new(
            ScriptedRunner::new(data),
            profile(),
            RuntimePaths::new(tmp.path()),
        );

        let outcome = acquirer.acquire(&release, "jdk-17.tar.gz").await.unwrap();
        assert!(outcome.verdict.passed());
        assert_eq!(outcome.unpacked_to.as_deref(), Some(tmp.path().join("runtimes/jdk-17").as_path()));
        assert_eq!(
            *acquirer.runner().calls.lock().unwrap(),
            vec!["download", "unpack"]
        );
    }

    #[tokio::test]
    async fn corrupt_artifact_never_reaches_unpack() {
        let tmp = tempdir().unwrap();
        let data = b"archive-bytes".to_vec();
        let mut release = release_for(&data, Some(checksum_hex(&data)));
        release.size_bytes += 1;
        let acquirer = Acquirer::new(
            ScriptedRunner::new(data),
            profile(),
            RuntimePaths::new(tmp.path()),
        );

        let outcome = acquirer.acquire(&release, "jdk-17.tar.gz").await.unwrap();
        assert!(!outcome.verdict.passed());
        assert!(outcome.unpacked_to.is_none());
        assert!(!outcome.artifact.exists());
        // The unpack root never saw the corrupt artifact.
        assert!(!tmp.path().join("runtimes").join("jdk-17").exists());
        assert_eq!(*acquirer.runner().calls.lock().unwrap(), vec!["download"]);
    }

    #[tokio::test]
    async fn failed_download_job_cleans_up_and_surfaces() {
        struct FailingRunner;
        impl JobRunner for FailingRunner {
            fn download(&self, _url: &str, dest: &Path) -> JobHandle {
                // Simulate a partial transfer left at the destination.
                std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
                std::fs::write(dest, b"partial").unwrap();
                ScriptedRunner::complete(Err(JobError::Download("connection reset".into())))
            }
            fn unpack(&self, _archive: &Path, _dest: &Path) -> JobHandle {
                panic!("unpack must not run after a failed download");
            }
            fn cancel(&self, _id: JobId) {}
            fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
                tokio::sync::broadcast::channel(1).1
            }
        }

        let tmp = tempdir().unwrap();
        let data = b"archive-bytes".to_vec();
        let release = release_for(&data, None);
        let acquirer = Acquirer::new(FailingRunner, profile(), RuntimePaths::new(tmp.path()));

        let result = acquirer.acquire(&release, "jdk-17.tar.gz").await;
        assert!(matches!(result, Err(AcquireError::Job(_))));
        assert!(!tmp.path().join("downloads/jdk-17.tar.gz").exists());
    }
}
