//! # warc-pipeline
//!
//! Work-item pipeline for a distributed web-archiving client.
//!
//! The crate acquires batches of crawl targets from a coordinator, prepares
//! an isolated workspace per batch, drives an external `wget-at` crawl,
//! verifies the produced zstd capture against the project dictionary,
//! reconciles aborted targets, and reports stats, artifacts, and completion
//! back to the coordinator.
//!
//! ## Design Philosophy
//!
//! warc-pipeline is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to batch lifecycle events
//! - **Honest about failure** - Every batch failure carries a
//!   requeue-vs-permanent disposition
//! - **Concurrent** - Several workers share one dictionary cache and one
//!   upload-slot pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use warc_pipeline::{Config, Pipeline, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         workers: 2,
//!         ..Default::default()
//!     };
//!
//!     let pipeline = Pipeline::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Run with automatic signal handling
//!     let stats = run_with_shutdown(pipeline).await?;
//!     println!("Completed {} batches", stats.batches_completed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Crawl invocation and execution
pub mod crawl;
/// Coordinator dictionary cache
pub mod dictionary;
/// Error types
pub mod error;
/// Batch lifecycle orchestration
pub mod pipeline;
/// Aborted-target reconciliation
pub mod prune;
/// Stats, upload, and completion reporting
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Coordinator HTTP client
pub mod tracker;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Capture integrity verification
pub mod verify;
/// Per-batch workspace management
pub mod workspace;

// Re-export commonly used types
pub use config::Config;
pub use crawl::{CliCrawlRunner, CrawlRunner, InvocationSpec};
pub use error::{BatchError, Error, FailureDisposition, Result, TrackerError};
pub use pipeline::Pipeline;
pub use report::{Reporter, RsyncUploader, Uploader};
pub use types::{
    Batch, DictionaryBinding, Event, PipelineStats, Stage, Target, TargetKind,
};

/// Version label reported to the coordinator
///
/// Bumped whenever the crawl arguments or reporting semantics change in a
/// way the coordinator should be able to distinguish.
pub const VERSION: &str = "20260825.01";

/// Helper function to run the pipeline with graceful signal handling.
///
/// Drives [`Pipeline::run`] and requests shutdown on a termination signal,
/// then waits for the workers to stop and returns the run's stats.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use warc_pipeline::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     let stats = run_with_shutdown(pipeline).await?;
///     println!("Uploaded {} bytes", stats.bytes_uploaded);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: Pipeline) -> Result<PipelineStats> {
    let runner = pipeline.clone();
    let mut run_handle = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = &mut run_handle => return flatten_run(result),
        _ = wait_for_signal() => {
            pipeline.shutdown();
        }
    }

    flatten_run(run_handle.await)
}

fn flatten_run(
    result: std::result::Result<Result<PipelineStats>, tokio::task::JoinError>,
) -> Result<PipelineStats> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(Error::Io(std::io::Error::other(format!(
            "pipeline task failed: {e}"
        )))),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
