//! Error types for warc-pipeline
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Batch, Tracker, Environment, etc.)
//! - The requeue-vs-permanent disposition contract for batch failures
//! - Context information (exit codes, hashes, offending entries)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for warc-pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for warc-pipeline
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "data_root")
        key: Option<String>,
    },

    /// Environment failure that is fatal for the whole process (firewalled
    /// DNS, missing crawl executable)
    #[error("environment error: {0}")]
    Environment(String),

    /// Failure of a single batch; carries its requeue-vs-permanent disposition
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Coordinator protocol error
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (crawl executable, rsync)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

/// Failures scoped to one batch
#[derive(Debug, Error)]
pub enum BatchError {
    /// The crawl executable exited with a code outside the accepted set
    #[error("crawl process exited with code {code}")]
    ExecutionFailed {
        /// The unaccepted exit code (accepted codes are 0, 4 and 8)
        code: i32,
    },

    /// The capture did not decompress cleanly under the bound dictionary
    #[error("capture {path} failed verification: {reason}")]
    CorruptCapture {
        /// The capture file that failed to decompress
        path: PathBuf,
        /// The decoder error that aborted verification
        reason: String,
    },

    /// Downloaded dictionary bytes do not hash to the coordinator's digest
    #[error("Hash of downloaded dictionary does not match.")]
    DictionaryMismatch {
        /// The sha256 digest the coordinator advertised
        expected: String,
        /// The sha256 digest of the bytes actually downloaded
        actual: String,
    },

    /// An aborted entry matched no target in the batch
    #[error("aborted entry {entry:?} matches no target in the batch")]
    PruneMismatch {
        /// The aborted entry (as read from the bad-items file) that failed to match
        entry: String,
    },

    /// A target carried a kind the argument builder does not recognize
    #[error("unknown target kind: {kind}")]
    UnknownTargetKind {
        /// The unrecognized kind prefix (everything before the first ':')
        kind: String,
    },

    /// Artifact upload failed after transport-level retries were exhausted
    #[error("upload failed: {reason}")]
    UploadFailed {
        /// The last transport error observed
        reason: String,
    },
}

/// Coordinator protocol errors
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The coordinator answered with a non-success HTTP status
    #[error("{endpoint} returned HTTP {status}")]
    BadStatus {
        /// The endpoint that was called (e.g., "batch", "dictionary")
        endpoint: String,
        /// The HTTP status code received
        status: u16,
    },

    /// The coordinator's response body did not match the expected shape
    #[error("malformed {endpoint} response: {reason}")]
    MalformedResponse {
        /// The endpoint that was called
        endpoint: String,
        /// What was wrong with the body
        reason: String,
    },

    /// The coordinator did not assign a usable upload target
    #[error("no upload target assigned: {0}")]
    NoUploadTarget(String),
}

/// What the orchestrator should do with a failed batch
///
/// The coordinator re-hands-out batches that are never reported, so a
/// requeued batch is simply left unreported; a permanent failure is logged
/// with its full target list and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDisposition {
    /// Leave the batch unreported so the coordinator hands it out again
    Requeue,
    /// Never retry; the batch is lost to this failure
    Permanent,
}

impl BatchError {
    /// Map this failure to its retry disposition.
    ///
    /// Execution and upload failures are transient from the coordinator's
    /// point of view; everything else indicates corrupt state or a protocol
    /// inconsistency that re-running would only repeat.
    pub fn disposition(&self) -> FailureDisposition {
        match self {
            BatchError::ExecutionFailed { .. } => FailureDisposition::Requeue,
            BatchError::UploadFailed { .. } => FailureDisposition::Requeue,
            BatchError::CorruptCapture { .. } => FailureDisposition::Permanent,
            BatchError::DictionaryMismatch { .. } => FailureDisposition::Permanent,
            BatchError::PruneMismatch { .. } => FailureDisposition::Permanent,
            BatchError::UnknownTargetKind { .. } => FailureDisposition::Permanent,
        }
    }
}

impl Error {
    /// Retry disposition for errors that fail a batch.
    ///
    /// Non-batch errors reaching the per-batch driver (tracker hiccups, I/O)
    /// are treated as requeue: the batch stays unreported and the coordinator
    /// hands it out again.
    pub fn disposition(&self) -> FailureDisposition {
        match self {
            Error::Batch(e) => e.disposition(),
            _ => FailureDisposition::Requeue,
        }
    }

    /// True for failures that must terminate the whole run loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Environment(_) | Error::Config { .. })
    }
}
