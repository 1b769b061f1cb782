//! Worker acquisition loop
//!
//! Each worker polls the coordinator for a batch of target names, runs the
//! environment self-check on its cadence, and hands acquired batches to the
//! batch state machine. Workers stop acquiring as soon as shutdown is
//! requested and return an error only on fatal conditions, which cancels
//! the whole pipeline.

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::types::{Batch, Event, Stage, TARGET_SEPARATOR};
use crate::utils::sha1_hex;

use super::{Pipeline, batch};

pub(crate) async fn run_worker(pipeline: Pipeline, worker_id: usize) -> Result<()> {
    info!(worker_id, "Worker started");

    loop {
        if pipeline.is_shutting_down() {
            break;
        }

        if let Err(e) = pipeline.maybe_check_environment().await {
            error!(worker_id, error = %e, "Environment self-check failed, stopping");
            pipeline.run_state.cancel.cancel();
            return Err(e);
        }

        match pipeline.resources.tracker.request_batch().await {
            Ok(Some(names)) => acquire_and_run(&pipeline, names).await,
            Ok(None) => {
                info!(worker_id, "No work available, waiting");
                idle(&pipeline).await;
            }
            Err(e) if e.is_fatal() => {
                error!(worker_id, error = %e, "Fatal acquisition failure, stopping");
                pipeline.run_state.cancel.cancel();
                return Err(e);
            }
            Err(e) => {
                warn!(worker_id, error = %e, "Batch acquisition failed, waiting");
                idle(&pipeline).await;
            }
        }
    }

    info!(worker_id, "Worker stopped");
    Ok(())
}

/// Parse the acquired names into a batch and run it
///
/// A name the coordinator hands out that does not parse fails the batch at
/// the acquisition stage without ever creating a workspace.
async fn acquire_and_run(pipeline: &Pipeline, names: Vec<String>) {
    let batch = Batch::new(
        &names,
        &pipeline.config.crawl.warc_prefix,
        pipeline.config.crawl.concurrency,
    );
    match batch {
        Ok(batch) => batch::run_batch(pipeline, batch).await,
        Err(e) => {
            let workspace_hash = sha1_hex(names.join(TARGET_SEPARATOR).as_bytes());
            let disposition = e.disposition();
            error!(
                workspace_hash = %workspace_hash,
                targets = ?names,
                error = %e,
                "Acquired batch could not be parsed"
            );
            pipeline.run_state.counters.record_failed();
            pipeline.emit_event(Event::BatchFailed {
                workspace_hash,
                stage: Stage::Acquired,
                error: e.to_string(),
                disposition,
                workspace_kept: false,
                exit_code: None,
            });
        }
    }
}

/// Sleep out the poll delay, waking early on shutdown
async fn idle(pipeline: &Pipeline) {
    tokio::select! {
        _ = pipeline.run_state.cancel.cancelled() => {}
        _ = sleep(pipeline.config.tracker.poll_delay) => {}
    }
}
