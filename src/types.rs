//! Core types for warc-pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BatchError, FailureDisposition};

/// Separator between target names inside a coordinator-assigned batch name.
///
/// Appears only at the protocol and hashing boundary; everywhere else the
/// batch is a proper sequence of [`Target`]s.
pub const TARGET_SEPARATOR: &str = "\0";

/// Kind of a crawl target, the prefix before the first `:` in its wire name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A project domain; seeded through the domain-lookup API endpoint
    Domain,
    /// A hosted asset; seeded directly over https
    Asset,
}

impl TargetKind {
    /// The wire prefix for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Domain => "domain",
            TargetKind::Asset => "asset",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed crawl reference within a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// What the value refers to
    pub kind: TargetKind,
    /// Everything after the first `:` in the wire name, unmodified
    pub value: String,
}

impl Target {
    /// Reassemble the wire form (`kind:value`).
    ///
    /// Lossless: parsing splits on the first `:` only, so values containing
    /// further colons survive the round trip.
    pub fn name(&self) -> String {
        format!("{}:{}", self.kind, self.value)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

impl std::str::FromStr for Target {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, value)) = s.split_once(':') else {
            return Err(BatchError::UnknownTargetKind {
                kind: s.to_string(),
            });
        };
        let kind = match kind {
            "domain" => TargetKind::Domain,
            "asset" => TargetKind::Asset,
            other => {
                return Err(BatchError::UnknownTargetKind {
                    kind: other.to_string(),
                });
            }
        };
        Ok(Self {
            kind,
            value: value.to_string(),
        })
    }
}

/// Dictionary identity stamped onto a batch at argument-build time
///
/// Carried until relocation, where it becomes part of the final capture
/// file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DictionaryBinding {
    /// Project the dictionary belongs to
    pub project: String,
    /// Dictionary id as reported by the coordinator
    pub id: String,
}

/// Unit of work assigned by the coordinator
///
/// `raw_name` and `workspace_hash` are fixed at construction; `targets`
/// shrinks when aborted entries are pruned, which deliberately does not
/// disturb any in-flight file path derived from the hash.
#[derive(Clone, Debug)]
pub struct Batch {
    /// The assigned name exactly as hashed: target names joined by NUL
    pub raw_name: String,
    /// Parsed targets in assignment order; duplicates are kept
    pub targets: Vec<Target>,
    /// SHA-1 hex of `raw_name`
    pub workspace_hash: String,
    /// Base name for capture files: `<prefix>-<hash>-<timestamp>`
    pub capture_base: String,
    /// Crawl-process parallelism to request
    pub concurrency_hint: u32,
    /// When the batch was dequeued
    pub created_at: DateTime<Utc>,
    /// Set once the crawl arguments are built, None before that
    pub dictionary: Option<DictionaryBinding>,
}

impl Batch {
    /// Build a batch from the coordinator's target names.
    ///
    /// Fails with [`BatchError::UnknownTargetKind`] if any name carries an
    /// unrecognized kind prefix (or no prefix at all).
    pub fn new(names: &[String], warc_prefix: &str, concurrency_hint: u32) -> Result<Self, BatchError> {
        let raw_name = names.join(TARGET_SEPARATOR);
        let targets = names
            .iter()
            .map(|n| n.parse::<Target>())
            .collect::<Result<Vec<_>, _>>()?;
        let workspace_hash = crate::utils::sha1_hex(raw_name.as_bytes());
        let created_at = Utc::now();
        let capture_base = format!(
            "{}-{}-{}",
            warc_prefix,
            workspace_hash,
            created_at.format("%Y%m%d-%H%M%S")
        );
        Ok(Self {
            raw_name,
            targets,
            workspace_hash,
            capture_base,
            concurrency_hint,
            created_at,
            dictionary: None,
        })
    }

    /// Wire names of the current (possibly pruned) targets.
    pub fn names(&self) -> Vec<String> {
        self.targets.iter().map(Target::name).collect()
    }

    /// Current target names joined by newlines, the form the crawl process
    /// receives in its environment.
    pub fn newline_joined_names(&self) -> String {
        self.names().join("\n")
    }

    /// True once pruning has removed every target.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Lifecycle stage of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Dequeued from the coordinator
    Acquired,
    /// Workspace directory provisioned
    WorkspaceReady,
    /// Crawl process finished with an accepted exit code
    Executed,
    /// Capture decompressed cleanly under the bound dictionary
    Verified,
    /// Aborted targets reconciled out of the batch
    Pruned,
    /// Stats posted and artifacts uploaded
    Reported,
    /// Acknowledged by the coordinator and torn down
    Done,
    /// Absorbing failure state
    Failed,
}

impl Stage {
    /// True for the two states a batch never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

/// Event emitted during batch lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch dequeued from the coordinator
    BatchAcquired {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// Wire names of the assigned targets
        targets: Vec<String>,
    },

    /// Workspace directory provisioned
    WorkspacePrepared {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// The provisioned directory
        dir: PathBuf,
    },

    /// Crawl process exited with an accepted code
    CrawlFinished {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// The exit code (0, 4 or 8)
        exit_code: i32,
    },

    /// Capture decompressed cleanly under the bound dictionary
    CaptureVerified {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// Compressed size of the capture in bytes
        capture_bytes: u64,
    },

    /// Aborted targets removed from the batch
    TargetsPruned {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// Number of targets removed
        removed: usize,
        /// Number of targets remaining
        remaining: usize,
    },

    /// Artifacts transferred to the assigned upload target
    UploadComplete {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// Total bytes transferred
        bytes: u64,
    },

    /// Batch reported and acknowledged
    BatchComplete {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// Number of targets in the completion report
        reported_targets: usize,
    },

    /// Batch failed
    BatchFailed {
        /// Workspace hash identifying the batch
        workspace_hash: String,
        /// Stage in which the failure occurred
        stage: Stage,
        /// Error message
        error: String,
        /// Whether the coordinator will hand the batch out again
        disposition: FailureDisposition,
        /// Whether the workspace was preserved for inspection
        workspace_kept: bool,
        /// Crawl exit code, for execution failures
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Counters accumulated over a pipeline run
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Batches that reached Done
    pub batches_completed: u64,

    /// Batches that ended in Failed (either disposition)
    pub batches_failed: u64,

    /// Targets included in completion reports
    pub targets_reported: u64,

    /// Bytes transferred to upload targets
    pub bytes_uploaded: u64,
}
