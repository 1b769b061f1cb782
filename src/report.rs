//! Stats reporting and artifact upload
//!
//! The last wire-facing stage of a batch. Builds the stats payload, sends
//! it to the coordinator, transfers the relocated artifacts to the assigned
//! upload target, and finally marks the batch done. Uploads across all
//! in-flight batches share one global slot semaphore. A batch whose targets
//! were all pruned skips every wire call and completes locally.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::{Config, RetryConfig};
use crate::error::{BatchError, Error, Result};
use crate::retry::transfer_with_retry;
use crate::tracker::TrackerClient;
use crate::types::Batch;
use crate::utils::{file_sha1, file_size};
use crate::workspace::RelocatedArtifacts;

/// Fixed rsync flags, applied before the files and the target
const RSYNC_EXTRA_ARGS: [&str; 9] = [
    "--recursive",
    "--min-size",
    "1",
    "--no-compress",
    "--compress-level",
    "0",
    "--partial",
    "--partial-dir",
    ".rsync-tmp",
];

/// Stats group key for capture bytes
const BYTES_GROUP: &str = "data";

/// Pre-upload stats payload sent to the coordinator
#[derive(Clone, Debug, Serialize)]
pub struct StatsPayload {
    /// Worker nickname
    pub downloader: String,
    /// Pipeline version label
    pub version: String,
    /// Client identification (crate name and version)
    pub client: String,
    /// Content hash of the argument-building logic
    pub pipeline_hash: String,
    /// Content hash of the crawl script on disk
    pub script_hash: String,
    /// Byte counts by group; `data` holds the capture size
    pub bytes: HashMap<String, u64>,
    /// Targets surviving pruning
    pub targets: Vec<String>,
}

/// Transfers finished artifacts to an upload target
///
/// Implemented by [`RsyncUploader`]; tests substitute scripted uploaders.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transfer `files` to `target`, retrying transient failures internally
    async fn upload(&self, target: &str, files: &[PathBuf]) -> Result<()>;
}

/// Uploads artifacts with the rsync binary
#[derive(Clone, Debug)]
pub struct RsyncUploader {
    binary: PathBuf,
    retry: RetryConfig,
}

impl RsyncUploader {
    /// Locate rsync and build the uploader
    ///
    /// # Errors
    /// Returns [`Error::Environment`] when no usable rsync binary is found.
    pub fn new(config: &Config) -> Result<Self> {
        let binary = match &config.upload.rsync_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::Environment(format!(
                        "configured rsync binary does not exist: {}",
                        path.display()
                    )));
                }
                path.clone()
            }
            None => which::which("rsync").map_err(|e| {
                Error::Environment(format!("rsync not found on PATH: {e}"))
            })?,
        };

        Ok(Self {
            binary,
            retry: config.retry.clone(),
        })
    }

    async fn upload_once(&self, target: &str, files: &[PathBuf]) -> Result<()> {
        let mut command = Command::new(&self.binary);
        command.args(RSYNC_EXTRA_ARGS).args(files).arg(target);

        let output = command.output().await.map_err(|e| {
            Error::ExternalTool(format!("Failed to execute rsync: {e}"))
        })?;

        match output.status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(Error::ExternalTool(format!(
                "rsync exited with code {code}"
            ))),
            None => Err(Error::ExternalTool(
                "rsync was terminated by a signal".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Uploader for RsyncUploader {
    async fn upload(&self, target: &str, files: &[PathBuf]) -> Result<()> {
        debug!(target = %target, files = files.len(), "Starting rsync upload");
        transfer_with_retry(&self.retry, || self.upload_once(target, files)).await?;
        info!(target = %target, "Upload finished");
        Ok(())
    }
}

/// Drives the stats, upload, and completion calls for finished batches
pub struct Reporter {
    tracker: TrackerClient,
    uploader: Arc<dyn Uploader>,
    upload_slots: Arc<Semaphore>,
    downloader: String,
    version: String,
    script_path: PathBuf,
}

impl Reporter {
    /// Build a reporter sharing `upload_slots` with every other batch
    pub fn new(
        config: &Config,
        tracker: TrackerClient,
        uploader: Arc<dyn Uploader>,
        upload_slots: Arc<Semaphore>,
    ) -> Self {
        Self {
            tracker,
            uploader,
            upload_slots,
            downloader: config.tracker.downloader.clone(),
            version: config.tracker.version.clone(),
            script_path: config.crawl.script_path.clone(),
        }
    }

    /// Report `batch` to the coordinator and upload its artifacts
    ///
    /// Returns the number of capture bytes uploaded. An empty batch (every
    /// target aborted) completes immediately with no wire calls and no
    /// upload; its relocated artifacts stay on disk.
    pub async fn report(&self, batch: &Batch, artifacts: &RelocatedArtifacts) -> Result<u64> {
        if batch.is_empty() {
            info!(
                batch = %batch.workspace_hash,
                "Every target was aborted, completing without upload"
            );
            return Ok(0);
        }

        let capture_bytes = file_size(&artifacts.capture).await?;
        let stats = self.build_stats(batch, capture_bytes).await?;
        self.tracker.send_report(&stats).await?;

        {
            // One global pool of upload slots across all in-flight batches.
            let _permit = self
                .upload_slots
                .acquire()
                .await
                .map_err(|_| Error::Environment("upload slots closed".to_string()))?;

            let target = self.tracker.upload_target().await?;
            let files = vec![artifacts.capture.clone(), artifacts.side_data.clone()];
            self.uploader
                .upload(&target, &files)
                .await
                .map_err(|e| match e {
                    Error::Batch(_) => e,
                    other => Error::Batch(BatchError::UploadFailed {
                        reason: other.to_string(),
                    }),
                })?;
        }

        self.tracker.mark_done(&batch.names(), &stats.bytes).await?;
        Ok(capture_bytes)
    }

    async fn build_stats(&self, batch: &Batch, capture_bytes: u64) -> Result<StatsPayload> {
        Ok(StatsPayload {
            downloader: self.downloader.clone(),
            version: self.version.clone(),
            client: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            pipeline_hash: crate::crawl::logic_hash(),
            script_hash: file_sha1(&self.script_path).await?,
            bytes: HashMap::from([(BYTES_GROUP.to_string(), capture_bytes)]),
            targets: batch.names(),
        })
    }
}
