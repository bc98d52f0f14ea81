//! Narrow boundary to the asynchronous job system that performs byte-level
//! transfer and extraction.
//!
//! The acquisition pipeline holds one outstanding job at a time, awaits
//! only the completion signal, and never polls job internals. Lifecycle
//! events are emitted for UI layers but nothing in this crate consumes
//! them. [`TokioJobRunner`] is the in-process default; any worker-pool
//! implementation with the same contract can be substituted.

use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot, watch};
use uuid::Uuid;

/// Opaque job identifier.
pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Download,
    Unpack,
}

/// Lifecycle notifications emitted by a runner.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Created { id: JobId, kind: JobKind },
    Started { id: JobId },
    Progress { id: JobId, transferred: u64, total: Option<u64> },
    Completed { id: JobId },
    Failed { id: JobId, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job cancelled")]
    Cancelled,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Extraction failed: {0}")]
    Unpack(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handle for one submitted job: the opaque id plus its completion signal.
pub struct JobHandle {
    pub id: JobId,
    completion: oneshot::Receiver<Result<(), JobError>>,
}

impl JobHandle {
    pub fn new(id: JobId, completion: oneshot::Receiver<Result<(), JobError>>) -> Self {
        Self { id, completion }
    }

    /// Await the completion signal. A runner that dropped the job counts
    /// as cancellation.
    pub async fn wait(self) -> Result<(), JobError> {
        match self.completion.await {
            Ok(result) => result,
            Err(_) => Err(JobError::Cancelled),
        }
    }
}

/// Contract over the external job system.
pub trait JobRunner: Send + Sync {
    /// Start transferring `url` to `dest`, returning immediately.
    fn download(&self, url: &str, dest: &Path) -> JobHandle;

    /// Start extracting `archive` into `dest`, returning immediately.
    fn unpack(&self, archive: &Path, dest: &Path) -> JobHandle;

    /// Request cancellation of an in-flight job. Best effort; completion
    /// resolves with [`JobError::Cancelled`] once honoured.
    fn cancel(&self, id: JobId);

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<JobEvent>;
}

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1000;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tokio-task-backed job runner: streaming HTTP downloads with retry and
/// atomic rename, archive extraction on the blocking pool.
pub struct TokioJobRunner {
    http: reqwest::Client,
    events: broadcast::Sender<JobEvent>,
    cancellations: Arc<Mutex<HashMap<JobId, watch::Sender<bool>>>>,
}

impl TokioJobRunner {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            events,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn register(&self, id: JobId) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        if let Ok(mut cancellations) = self.cancellations.lock() {
            cancellations.insert(id, tx);
        }
        rx
    }
}

fn deregister(cancellations: &Mutex<HashMap<JobId, watch::Sender<bool>>>, id: JobId) {
    if let Ok(mut cancellations) = cancellations.lock() {
        cancellations.remove(&id);
    }
}

impl Default for TokioJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner for TokioJobRunner {
    fn download(&self, url: &str, dest: &Path) -> JobHandle {
        let id = Uuid::new_v4();
        let cancel = self.register(id);
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self.events.send(JobEvent::Created {
            id,
            kind: JobKind::Download,
        });

        let http = self.http.clone();
        let url = url.to_string();
        let dest = dest.to_path_buf();
        let events = self.events.clone();
        let cancellations = Arc::clone(&self.cancellations);
        tokio::spawn(async move {
            let _ = events.send(JobEvent::Started { id });
            let result = run_download(&http, &url, &dest, &cancel, &events, id).await;
            deregister(&cancellations, id);
            match &result {
                Ok(()) => {
                    let _ = events.send(JobEvent::Completed { id });
                }
                Err(e) => {
                    let _ = events.send(JobEvent::Failed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
            let _ = done_tx.send(result);
        });

        JobHandle::new(id, done_rx)
    }

    fn unpack(&self, archive: &Path, dest: &Path) -> JobHandle {
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self.events.send(JobEvent::Created {
            id,
            kind: JobKind::Unpack,
        });

        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(JobEvent::Started { id });
            let result = run_unpack(&archive, &dest).await;
            match &result {
                Ok(()) => {
                    let _ = events.send(JobEvent::Completed { id });
                }
                Err(e) => {
                    let _ = events.send(JobEvent::Failed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
            let _ = done_tx.send(result);
        });

        JobHandle::new(id, done_rx)
    }

    fn cancel(&self, id: JobId) {
        if let Ok(cancellations) = self.cancellations.lock() {
            if let Some(tx) = cancellations.get(&id) {
                let _ = tx.send(true);
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

async fn run_download(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
    cancel: &watch::Receiver<bool>,
    events: &broadcast::Sender<JobEvent>,
    id: JobId,
) -> Result<(), JobError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut attempt = 0;
    loop {
        match stream_to_file(http, url, dest, cancel, events, id).await {
            Ok(()) => return Ok(()),
            Err(JobError::Cancelled) => return Err(JobError::Cancelled),
            Err(e) => {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    log::error!("Download of {} failed after {} attempts: {}", url, attempt, e);
                    return Err(e);
                }
                log::warn!(
                    "Download failed (attempt {}/{}): {}. Retrying...",
                    attempt,
                    MAX_RETRIES,
                    e
                );
                tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64))
                    .await;
            }
        }
    }
}

async fn stream_to_file(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
    cancel: &watch::Receiver<bool>,
    events: &broadcast::Sender<JobEvent>,
    id: JobId,
) -> Result<(), JobError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| JobError::Download(e.to_string()))?;
    if !response.status().is_success() {
        return Err(JobError::Download(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    // Write to a .part file and rename into place so a failed transfer
    // never leaves a partial file at the destination name.
    let tmp_name = format!(
        "{}.part",
        dest.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    let tmp = dest.with_file_name(tmp_name);
    let mut file = tokio::fs::File::create(&tmp).await?;

    let copied = copy_body(response, &mut file, cancel, events, id).await;
    if let Err(e) = copied {
        drop(file);
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, dest).await?;
    log::debug!("Download complete: {} -> {:?}", url, dest);
    Ok(())
}

async fn copy_body(
    response: reqwest::Response,
    file: &mut tokio::fs::File,
    cancel: &watch::Receiver<bool>,
    events: &broadcast::Sender<JobEvent>,
    id: JobId,
) -> Result<(), JobError> {
    let total = response.content_length();
    let mut transferred: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        if *cancel.borrow() {
            log::warn!("Download job {} cancelled", id);
            return Err(JobError::Cancelled);
        }
        let chunk = chunk.map_err(|e| JobError::Download(e.to_string()))?;
        file.write_all(&chunk).await?;
        transferred += chunk.len() as u64;
        let _ = events.send(JobEvent::Progress {
            id,
            transferred,
            total,
        });
    }
    Ok(())
}

async fn run_unpack(archive: &Path, dest: &Path) -> Result<(), JobError> {
    tokio::fs::create_dir_all(dest).await?;

    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".zip") {
            unpack_zip(&archive, &dest)
        } else {
            unpack_tar_gz(&archive, &dest)
        }
    })
    .await
    .map_err(|e| JobError::Unpack(e.to_string()))?
}

fn unpack_zip(archive: &Path, dest: &Path) -> Result<(), JobError> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| JobError::Unpack(e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| JobError::Unpack(e.to_string()))?;
        let outpath = dest.join(entry.name());

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    log::debug!("Zip extraction complete: {:?}", dest);
    Ok(())
}

fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<(), JobError> {
    let file = std::fs::File::open(archive)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(dest)
        .map_err(|e| JobError::Unpack(e.to_string()))?;

    log::debug!("Tar extraction complete: {:?}", dest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_test_zip(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("jdk-17.0.2+8/bin/java", options).unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn unpack_job_extracts_zip() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("jdk.zip");
        write_test_zip(&archive);

        let runner = TokioJobRunner::new();
        let dest = tmp.path().join("out");
        let handle = runner.unpack(&archive, &dest);
        handle.wait().await.unwrap();

        assert!(dest.join("jdk-17.0.2+8/bin/java").is_file());
    }

    #[tokio::test]
    async fn unpack_job_extracts_tar_gz() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("jdk.tar.gz");
        {
            let file = std::fs::File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut tar = tar::Builder::new(encoder);
            let data = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            tar.append_data(&mut header, "jdk-17.0.2+8/bin/java", &data[..])
                .unwrap();
            tar.into_inner().unwrap().finish().unwrap();
        }

        let runner = TokioJobRunner::new();
        let dest = tmp.path().join("out");
        let handle = runner.unpack(&archive, &dest);
        handle.wait().await.unwrap();

        assert!(dest.join("jdk-17.0.2+8/bin/java").is_file());
    }

    #[tokio::test]
    async fn unpack_job_reports_missing_archive() {
        let tmp = tempdir().unwrap();
        let runner = TokioJobRunner::new();
        let handle = runner.unpack(&tmp.path().join("absent.zip"), &tmp.path().join("out"));
        assert!(handle.wait().await.is_err());
    }

    #[tokio::test]
    async fn download_job_emits_lifecycle_events() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive-bytes".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let runner = TokioJobRunner::new();
        let mut events = runner.subscribe();
        let dest = tmp.path().join("jdk.tar.gz");
        let handle = runner.download(&format!("{}/jdk.tar.gz", server.uri()), &dest);
        handle.wait().await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
        // Created must be the first event observed.
        match events.recv().await.unwrap() {
            JobEvent::Created { kind, .. } => assert_eq!(kind, JobKind::Download),
            other => panic!("unexpected first event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_download_resolves_cancelled_and_leaves_nothing() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.tar.gz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(300))
                    .set_body_bytes(vec![0u8; 1024 * 1024]),
            )
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let runner = TokioJobRunner::new();
        let dest = tmp.path().join("jdk.tar.gz");
        let handle = runner.download(&format!("{}/jdk.tar.gz", server.uri()), &dest);
        runner.cancel(handle.id);

        match handle.wait().await {
            Err(JobError::Cancelled) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file_behind() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jdk.tar.gz"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempdir().unwrap();
        let runner = TokioJobRunner::new();
        let dest = tmp.path().join("jdk.tar.gz");
        let handle = runner.download(&format!("{}/jdk.tar.gz", server.uri()), &dest);
        assert!(handle.wait().await.is_err());
        assert!(!dest.exists());
    }
}
