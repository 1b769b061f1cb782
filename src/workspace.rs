//! Per-batch workspace directories
//!
//! Every batch owns one directory under the configured data root, named by
//! its workspace hash. The directory holds the capture file, the side-data
//! report, the materialized compression dictionary, and whatever scratch
//! files the crawl process leaves behind. On success the artifacts are
//! relocated out and the directory removed; on permanent integrity failure
//! the directory is kept for inspection.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::types::{Batch, DictionaryBinding};

/// File name the dictionary is materialized under inside a workspace
const DICTIONARY_FILE: &str = "zstdict";

/// Creates and resolves workspaces under the configured roots
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    data_root: PathBuf,
    final_root: PathBuf,
}

impl WorkspaceManager {
    /// Build a manager over the configured storage roots
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            data_root: config.data_root().to_path_buf(),
            final_root: config.final_root().to_path_buf(),
        }
    }

    /// Create a clean workspace directory for `batch`
    ///
    /// A leftover directory from an earlier run of the same batch is removed
    /// first, so preparation always yields a clean slate. Empty placeholder
    /// files for the capture and the side-data report are created so the
    /// crawl process can open them by fixed path.
    pub async fn prepare(&self, batch: &Batch) -> Result<Workspace> {
        let dir = self.data_root.join(&batch.workspace_hash);

        if tokio::fs::metadata(&dir).await.is_ok() {
            debug!(dir = %dir.display(), "Removing stale workspace from a previous run");
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;

        let workspace = Workspace {
            dir,
            capture_base: batch.capture_base.clone(),
            final_root: self.final_root.clone(),
        };
        tokio::fs::write(workspace.capture_path(), []).await?;
        tokio::fs::write(workspace.side_data_path(), []).await?;

        debug!(
            batch = %batch.workspace_hash,
            dir = %workspace.dir.display(),
            "Prepared workspace"
        );
        Ok(workspace)
    }
}

/// Final locations of a batch's artifacts after [`Workspace::relocate`]
#[derive(Clone, Debug)]
pub struct RelocatedArtifacts {
    /// The renamed capture file, dictionary binding embedded in the name
    pub capture: PathBuf,
    /// The side-data file accompanying the capture
    pub side_data: PathBuf,
}

/// A prepared directory owned by one batch for its lifetime
#[derive(Clone, Debug)]
pub struct Workspace {
    dir: PathBuf,
    capture_base: String,
    final_root: PathBuf,
}

impl Workspace {
    /// The workspace directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture file the crawl process writes into
    pub fn capture_path(&self) -> PathBuf {
        self.dir.join(format!("{}.warc.zst", self.capture_base))
    }

    /// Side-data report the crawl process writes alongside the capture
    pub fn side_data_path(&self) -> PathBuf {
        self.dir.join(format!("{}_data.txt", self.capture_base))
    }

    /// Where the compression dictionary is materialized for the crawl process
    pub fn dictionary_path(&self) -> PathBuf {
        self.dir.join(DICTIONARY_FILE)
    }

    /// List of aborted targets the crawl process leaves behind, if any
    pub fn bad_items_path(&self) -> PathBuf {
        self.dir.join(format!("{}_bad-items.txt", self.capture_base))
    }

    /// Materialize `dictionary` at the fixed in-workspace path
    pub async fn write_dictionary(&self, dictionary: &Dictionary) -> Result<()> {
        tokio::fs::write(self.dictionary_path(), &dictionary.bytes).await?;
        Ok(())
    }

    /// Move the finished artifacts to their final locations and remove the
    /// workspace
    ///
    /// The capture file name gains the dictionary binding as a suffix so the
    /// receiving side knows which dictionary decompresses it.
    pub async fn relocate(&self, binding: &DictionaryBinding) -> Result<RelocatedArtifacts> {
        let capture = self.final_root.join(format!(
            "{}.{}.{}.warc.zst",
            self.capture_base, binding.project, binding.id
        ));
        let side_data = self
            .final_root
            .join(format!("{}_data.txt", self.capture_base));

        tokio::fs::rename(self.capture_path(), &capture).await?;
        tokio::fs::rename(self.side_data_path(), &side_data).await?;
        tokio::fs::remove_dir_all(&self.dir).await?;

        info!(capture = %capture.display(), "Relocated finished artifacts");
        Ok(RelocatedArtifacts { capture, side_data })
    }

    /// Remove the workspace directory and everything in it
    ///
    /// Safe to call when the directory is already gone.
    pub async fn teardown(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_batch() -> Batch {
        Batch::new(
            &["domain:example.com".to_string(), "asset:cdn.example.com/a.js".to_string()],
            "glitch",
            2,
        )
        .expect("test batch must build")
    }

    fn manager_in(data_root: &TempDir) -> WorkspaceManager {
        let mut config = Config::default();
        config.storage.data_root = data_root.path().to_path_buf();
        WorkspaceManager::new(&config)
    }

    #[tokio::test]
    async fn prepare_creates_clean_directory_with_placeholders() {
        let root = TempDir::new().unwrap();
        let batch = test_batch();

        let workspace = manager_in(&root).prepare(&batch).await.expect("prepare failed");

        assert_eq!(
            workspace.dir(),
            root.path().join(&batch.workspace_hash),
            "workspace directory must be named by the batch hash"
        );
        assert!(workspace.dir().is_dir());

        let capture = tokio::fs::metadata(workspace.capture_path()).await.unwrap();
        assert_eq!(capture.len(), 0, "capture placeholder must start empty");
        assert!(
            tokio::fs::metadata(workspace.side_data_path()).await.is_ok(),
            "side-data placeholder must exist"
        );
    }

    #[tokio::test]
    async fn prepare_removes_stale_directory_from_a_previous_run() {
        let root = TempDir::new().unwrap();
        let batch = test_batch();

        let stale_dir = root.path().join(&batch.workspace_hash);
        tokio::fs::create_dir_all(&stale_dir).await.unwrap();
        tokio::fs::write(stale_dir.join("leftover.tmp"), b"stale")
            .await
            .unwrap();

        let workspace = manager_in(&root).prepare(&batch).await.expect("prepare failed");

        assert!(
            tokio::fs::metadata(workspace.dir().join("leftover.tmp"))
                .await
                .is_err(),
            "stale files must not survive preparation"
        );
        assert!(tokio::fs::metadata(workspace.capture_path()).await.is_ok());
    }

    #[tokio::test]
    async fn write_dictionary_materializes_bytes_at_fixed_name() {
        let root = TempDir::new().unwrap();
        let workspace = manager_in(&root)
            .prepare(&test_batch())
            .await
            .expect("prepare failed");

        let dictionary = Dictionary {
            id: "7".to_string(),
            bytes: b"dictionary payload".to_vec(),
        };
        workspace
            .write_dictionary(&dictionary)
            .await
            .expect("write failed");

        let on_disk = tokio::fs::read(workspace.dir().join("zstdict")).await.unwrap();
        assert_eq!(on_disk, dictionary.bytes);
    }

    #[tokio::test]
    async fn relocate_renames_artifacts_and_removes_workspace() {
        let root = TempDir::new().unwrap();
        let batch = test_batch();
        let workspace = manager_in(&root).prepare(&batch).await.expect("prepare failed");

        tokio::fs::write(workspace.capture_path(), b"capture bytes")
            .await
            .unwrap();
        tokio::fs::write(workspace.side_data_path(), b"side data")
            .await
            .unwrap();

        let binding = DictionaryBinding {
            project: "glitch".to_string(),
            id: "42".to_string(),
        };
        let artifacts = workspace.relocate(&binding).await.expect("relocate failed");

        assert_eq!(
            artifacts.capture,
            root.path()
                .join(format!("{}.glitch.42.warc.zst", batch.capture_base)),
            "final capture name must carry the dictionary binding"
        );
        assert_eq!(
            artifacts.side_data,
            root.path().join(format!("{}_data.txt", batch.capture_base)),
            "side-data keeps its name, without the dictionary suffix"
        );
        assert_eq!(
            tokio::fs::read(&artifacts.capture).await.unwrap(),
            b"capture bytes"
        );
        assert!(
            tokio::fs::metadata(workspace.dir()).await.is_err(),
            "workspace directory must be removed after relocation"
        );
    }

    #[tokio::test]
    async fn relocate_honors_separate_final_root() {
        let data_root = TempDir::new().unwrap();
        let final_root = TempDir::new().unwrap();
        let batch = test_batch();

        let mut config = Config::default();
        config.storage.data_root = data_root.path().to_path_buf();
        config.storage.final_root = Some(final_root.path().to_path_buf());

        let workspace = WorkspaceManager::new(&config)
            .prepare(&batch)
            .await
            .expect("prepare failed");
        let binding = DictionaryBinding {
            project: "glitch".to_string(),
            id: "1".to_string(),
        };
        let artifacts = workspace.relocate(&binding).await.expect("relocate failed");

        assert!(
            artifacts.capture.starts_with(final_root.path()),
            "artifacts must land under the configured final root"
        );
    }

    #[tokio::test]
    async fn teardown_is_tolerant_of_missing_workspace() {
        let root = TempDir::new().unwrap();
        let workspace = manager_in(&root)
            .prepare(&test_batch())
            .await
            .expect("prepare failed");

        workspace.teardown().await.expect("first teardown failed");
        workspace
            .teardown()
            .await
            .expect("teardown of an already-removed workspace must succeed");
        assert!(tokio::fs::metadata(workspace.dir()).await.is_err());
    }
}
