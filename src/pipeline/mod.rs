//! Batch lifecycle orchestration
//!
//! [`Pipeline`] wires the coordinator client, dictionary cache, workspace
//! manager, crawl runner, and reporter together and drives batches through
//! their stages with a fixed pool of workers. Embedding applications
//! subscribe to lifecycle events and stop the pipeline through
//! [`Pipeline::shutdown`] or [`run_with_shutdown`](crate::run_with_shutdown).

mod batch;
mod env_check;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::crawl::{self, CliCrawlRunner, CrawlRunner};
use crate::dictionary::DictionaryCache;
use crate::error::{Error, Result};
use crate::report::{Reporter, RsyncUploader, Uploader};
use crate::tracker::TrackerClient;
use crate::types::{Event, PipelineStats};
use crate::workspace::WorkspaceManager;

/// Everything a worker needs to process one batch
#[derive(Clone)]
pub(crate) struct BatchResources {
    pub(crate) tracker: TrackerClient,
    pub(crate) dictionary: DictionaryCache,
    pub(crate) workspaces: WorkspaceManager,
    pub(crate) runner: Arc<dyn CrawlRunner>,
    pub(crate) reporter: Arc<Reporter>,
    /// Executable path baked into every crawl invocation
    pub(crate) crawl_executable: PathBuf,
}

/// Run-loop state shared by all workers
#[derive(Clone)]
pub(crate) struct RunState {
    pub(crate) cancel: CancellationToken,
    /// Acquisitions left until the next environment self-check. The decision
    /// happens under this lock; the check itself runs outside it.
    pub(crate) env_countdown: Arc<tokio::sync::Mutex<u32>>,
    pub(crate) counters: Arc<RunCounters>,
}

/// Atomic counters behind [`PipelineStats`]
#[derive(Default)]
pub(crate) struct RunCounters {
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    targets_reported: AtomicU64,
    bytes_uploaded: AtomicU64,
}

impl RunCounters {
    pub(crate) fn record_completed(&self, targets: usize, bytes: u64) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
        self.targets_reported
            .fetch_add(targets as u64, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            targets_reported: self.targets_reported.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
        }
    }
}

/// Batch-processing pipeline (cloneable, all shared state is Arc-wrapped)
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) resources: BatchResources,
    pub(crate) run_state: RunState,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline using the real crawl executable and rsync
    ///
    /// Locates both binaries, verifies the crawl script exists, and creates
    /// the storage directories.
    ///
    /// # Errors
    /// Returns [`Error::Environment`] when an external binary cannot be
    /// found and [`Error::Config`] when the crawl script is missing.
    pub async fn new(config: Config) -> Result<Self> {
        let executable = crawl::locate_crawl_executable(&config.crawl)?;
        let uploader: Arc<dyn Uploader> = Arc::new(RsyncUploader::new(&config)?);
        Self::assemble(config, executable, Arc::new(CliCrawlRunner), uploader).await
    }

    /// Create a pipeline with substituted crawl and upload implementations
    ///
    /// The seam for embedding applications and tests. No external binaries
    /// are located; the invocation executable falls back to the default
    /// candidate name when no explicit path is configured.
    pub async fn with_components(
        config: Config,
        runner: Arc<dyn CrawlRunner>,
        uploader: Arc<dyn Uploader>,
    ) -> Result<Self> {
        let executable = config
            .crawl
            .executable_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("wget-at"));
        Self::assemble(config, executable, runner, uploader).await
    }

    async fn assemble(
        config: Config,
        crawl_executable: PathBuf,
        runner: Arc<dyn CrawlRunner>,
        uploader: Arc<dyn Uploader>,
    ) -> Result<Self> {
        match tokio::fs::metadata(&config.crawl.script_path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => {
                return Err(Error::Config {
                    message: format!(
                        "crawl script not found: {}",
                        config.crawl.script_path.display()
                    ),
                    key: Some("crawl.script_path".to_string()),
                });
            }
        }

        tokio::fs::create_dir_all(config.data_root()).await?;
        tokio::fs::create_dir_all(config.final_root()).await?;

        let tracker = TrackerClient::new(&config)?;
        let dictionary = DictionaryCache::new(config.tracker.dictionary_ttl);
        let workspaces = WorkspaceManager::new(&config);
        let upload_slots = Arc::new(Semaphore::new(config.upload_slots()));
        let reporter = Arc::new(Reporter::new(
            &config,
            tracker.clone(),
            uploader,
            upload_slots,
        ));

        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            resources: BatchResources {
                tracker,
                dictionary,
                workspaces,
                runner,
                reporter,
                crawl_executable,
            },
            run_state: RunState {
                cancel: CancellationToken::new(),
                env_countdown: Arc::new(tokio::sync::Mutex::new(0)),
                counters: Arc::new(RunCounters::default()),
            },
        })
    }

    /// Drive workers until shutdown or a fatal environment failure
    ///
    /// Returns the accumulated counters after a graceful stop. A fatal error
    /// cancels the remaining workers and is returned once they have stopped.
    pub async fn run(&self) -> Result<PipelineStats> {
        let workers = self.config.workers.max(1);
        info!(
            workers,
            project = %self.config.tracker.project,
            version = %self.config.tracker.version,
            "Starting pipeline"
        );

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move {
                worker::run_worker(pipeline, worker_id).await
            }));
        }

        let mut fatal: Option<Error> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    if fatal.is_none() {
                        fatal = Some(Error::Io(std::io::Error::other(format!(
                            "worker task failed: {e}"
                        ))));
                    }
                }
            }
        }

        self.emit_event(Event::Shutdown);

        match fatal {
            Some(e) => {
                error!(error = %e, "Pipeline stopped on fatal error");
                Err(e)
            }
            None => {
                let stats = self.stats();
                info!(
                    batches_completed = stats.batches_completed,
                    batches_failed = stats.batches_failed,
                    targets_reported = stats.targets_reported,
                    bytes_uploaded = stats.bytes_uploaded,
                    "Pipeline stopped"
                );
                Ok(stats)
            }
        }
    }

    /// Subscribe to batch lifecycle events
    ///
    /// Multiple subscribers are supported; each receives every event. A
    /// subscriber that falls more than 1000 events behind observes a
    /// `Lagged` error and continues from the oldest retained event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the run counters
    pub fn stats(&self) -> PipelineStats {
        self.run_state.counters.snapshot()
    }

    /// Request a graceful stop
    ///
    /// Workers stop acquiring immediately. A batch that has not reached its
    /// upload stage is left unreported for the coordinator to hand out
    /// again; an upload already in progress completes.
    pub fn shutdown(&self) {
        info!("Pipeline shutdown requested");
        self.run_state.cancel.cancel();
    }

    /// True once [`shutdown`](Self::shutdown) was called or a fatal failure
    /// stopped the run
    pub fn is_shutting_down(&self) -> bool {
        self.run_state.cancel.is_cancelled()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() fails only when nobody is subscribed, which is fine
        self.event_tx.send(event).ok();
    }

    /// Consume one tick of the environment-check countdown
    ///
    /// The countdown starts at zero, so the first acquisition always checks.
    pub(crate) async fn env_check_due(&self) -> bool {
        let mut countdown = self.run_state.env_countdown.lock().await;
        if *countdown == 0 {
            *countdown = self.config.env_check_interval;
            true
        } else {
            *countdown -= 1;
            false
        }
    }

    pub(crate) async fn maybe_check_environment(&self) -> Result<()> {
        if self.config.skip_env_check {
            return Ok(());
        }
        if self.env_check_due().await {
            env_check::check_environment().await?;
        }
        Ok(())
    }
}
