//! Batch state machine
//!
//! [`run_batch`] drives one acquired batch through workspace preparation,
//! crawl execution, capture verification, pruning, relocation, and
//! reporting. Failures are absorbed here: the batch is logged, counted, and
//! announced, and the worker moves on to its next acquisition.
//!
//! A failed capture gets one second chance. When verification rejects the
//! capture, or the downloaded dictionary does not hash to the coordinator's
//! digest, the cached dictionary is discarded, the workspace is rebuilt,
//! and the crawl runs once more. A second integrity failure is permanent
//! and leaves the workspace on disk for inspection.

use tracing::{error, info, warn};

use crate::crawl::{self, ACCEPTED_EXIT_CODES};
use crate::error::{BatchError, Error, FailureDisposition};
use crate::prune;
use crate::types::{Batch, DictionaryBinding, Event, Stage};
use crate::utils::file_size;
use crate::verify;
use crate::workspace::Workspace;

use super::Pipeline;

/// What a successful crawl-and-verify attempt leaves behind
struct ExecutionOutcome {
    capture_bytes: u64,
    binding: DictionaryBinding,
}

pub(crate) async fn run_batch(pipeline: &Pipeline, mut batch: Batch) {
    info!(
        workspace_hash = %batch.workspace_hash,
        targets = batch.targets.len(),
        "Batch acquired"
    );
    pipeline.emit_event(Event::BatchAcquired {
        workspace_hash: batch.workspace_hash.clone(),
        targets: batch.names(),
    });

    let mut workspace = match pipeline.resources.workspaces.prepare(&batch).await {
        Ok(workspace) => workspace,
        Err(e) => {
            fail(pipeline, &batch, Stage::WorkspaceReady, &e, None).await;
            return;
        }
    };
    pipeline.emit_event(Event::WorkspacePrepared {
        workspace_hash: batch.workspace_hash.clone(),
        dir: workspace.dir().to_path_buf(),
    });

    let mut integrity_retried = false;
    let outcome = loop {
        match execute_once(pipeline, &mut batch, &workspace).await {
            Ok(outcome) => break outcome,
            Err(e) if is_integrity_failure(&e) && !integrity_retried => {
                integrity_retried = true;
                warn!(
                    workspace_hash = %batch.workspace_hash,
                    error = %e,
                    "Integrity failure, refreshing dictionary and retrying the crawl once"
                );
                pipeline.resources.dictionary.force_refresh().await;
                workspace = match pipeline.resources.workspaces.prepare(&batch).await {
                    Ok(workspace) => workspace,
                    Err(prep) => {
                        fail(pipeline, &batch, Stage::Executed, &prep, None).await;
                        return;
                    }
                };
            }
            Err(e) => {
                fail(pipeline, &batch, failure_stage(&e), &e, Some(&workspace)).await;
                return;
            }
        }
    };
    info!(
        workspace_hash = %batch.workspace_hash,
        capture_bytes = outcome.capture_bytes,
        "Capture verified"
    );
    pipeline.emit_event(Event::CaptureVerified {
        workspace_hash: batch.workspace_hash.clone(),
        capture_bytes: outcome.capture_bytes,
    });

    let aborted = match prune::load_aborted(&workspace).await {
        Ok(aborted) => aborted,
        Err(e) => {
            fail(pipeline, &batch, Stage::Pruned, &e, Some(&workspace)).await;
            return;
        }
    };
    if !aborted.is_empty() {
        let before = batch.targets.len();
        if let Err(e) = prune::prune(&mut batch, &aborted) {
            let e = Error::Batch(e);
            fail(pipeline, &batch, Stage::Pruned, &e, Some(&workspace)).await;
            return;
        }
        let remaining = batch.targets.len();
        info!(
            workspace_hash = %batch.workspace_hash,
            removed = before - remaining,
            remaining,
            "Aborted targets pruned"
        );
        pipeline.emit_event(Event::TargetsPruned {
            workspace_hash: batch.workspace_hash.clone(),
            removed: before - remaining,
            remaining,
        });
    }

    // A batch never starts its upload stage after cancellation.
    if pipeline.is_shutting_down() {
        info!(
            workspace_hash = %batch.workspace_hash,
            "Shutdown before upload, leaving batch unreported"
        );
        if let Err(e) = workspace.teardown().await {
            warn!(
                workspace_hash = %batch.workspace_hash,
                error = %e,
                "Workspace teardown failed"
            );
        }
        return;
    }

    let artifacts = match workspace.relocate(&outcome.binding).await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            fail(pipeline, &batch, Stage::Reported, &e, Some(&workspace)).await;
            return;
        }
    };

    let uploaded = match pipeline.resources.reporter.report(&batch, &artifacts).await {
        Ok(uploaded) => uploaded,
        Err(e) => {
            fail(pipeline, &batch, Stage::Reported, &e, Some(&workspace)).await;
            return;
        }
    };
    if !batch.is_empty() {
        pipeline.emit_event(Event::UploadComplete {
            workspace_hash: batch.workspace_hash.clone(),
            bytes: uploaded,
        });
    }

    pipeline
        .run_state
        .counters
        .record_completed(batch.targets.len(), uploaded);
    info!(
        workspace_hash = %batch.workspace_hash,
        targets = batch.targets.len(),
        bytes = uploaded,
        "Batch complete"
    );
    pipeline.emit_event(Event::BatchComplete {
        workspace_hash: batch.workspace_hash.clone(),
        reported_targets: batch.targets.len(),
    });
}

/// Run the crawl once and verify its capture
///
/// Binds the current dictionary to the batch before the crawl so the
/// capture is always checked against the exact bytes the crawl compressed
/// with, even when the coordinator rotates dictionaries mid-run.
async fn execute_once(
    pipeline: &Pipeline,
    batch: &mut Batch,
    workspace: &Workspace,
) -> crate::error::Result<ExecutionOutcome> {
    let dictionary = pipeline
        .resources
        .dictionary
        .get(&pipeline.resources.tracker)
        .await?;
    workspace.write_dictionary(&dictionary).await?;
    let binding = DictionaryBinding {
        project: pipeline.config.tracker.project.clone(),
        id: dictionary.id.clone(),
    };
    batch.dictionary = Some(binding.clone());

    let spec = crawl::build_invocation(
        batch,
        workspace,
        &pipeline.resources.crawl_executable,
        &pipeline.config,
    );
    let exit_code = pipeline.resources.runner.run(&spec).await?;
    if !ACCEPTED_EXIT_CODES.contains(&exit_code) {
        return Err(Error::Batch(BatchError::ExecutionFailed { code: exit_code }));
    }
    info!(
        workspace_hash = %batch.workspace_hash,
        exit_code,
        "Crawl finished"
    );
    pipeline.emit_event(Event::CrawlFinished {
        workspace_hash: batch.workspace_hash.clone(),
        exit_code,
    });

    verify::verify(&workspace.capture_path(), &dictionary).await?;
    let capture_bytes = file_size(&workspace.capture_path()).await?;

    Ok(ExecutionOutcome {
        capture_bytes,
        binding,
    })
}

/// Record a batch failure: dispose of the workspace, log, count, announce
///
/// Permanent failures keep the workspace on disk for inspection; requeued
/// failures tear it down so the next assignment starts clean. A teardown
/// that fails leaves the directory behind, which the next preparation of
/// the same batch removes.
async fn fail(
    pipeline: &Pipeline,
    batch: &Batch,
    stage: Stage,
    error: &Error,
    workspace: Option<&Workspace>,
) {
    let disposition = error.disposition();
    let workspace_kept = match (disposition, workspace) {
        (FailureDisposition::Permanent, Some(workspace)) => {
            info!(
                workspace_hash = %batch.workspace_hash,
                dir = %workspace.dir().display(),
                "Keeping workspace for inspection"
            );
            true
        }
        (FailureDisposition::Requeue, Some(workspace)) => match workspace.teardown().await {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    workspace_hash = %batch.workspace_hash,
                    error = %e,
                    "Workspace teardown failed"
                );
                true
            }
        },
        (_, None) => false,
    };

    match disposition {
        FailureDisposition::Permanent => error!(
            workspace_hash = %batch.workspace_hash,
            stage = ?stage,
            targets = ?batch.names(),
            error = %error,
            workspace_kept,
            "Batch failed permanently"
        ),
        FailureDisposition::Requeue => warn!(
            workspace_hash = %batch.workspace_hash,
            stage = ?stage,
            error = %error,
            "Batch failed, leaving it for the coordinator to hand out again"
        ),
    }

    pipeline.run_state.counters.record_failed();
    pipeline.emit_event(Event::BatchFailed {
        workspace_hash: batch.workspace_hash.clone(),
        stage,
        error: error.to_string(),
        disposition,
        workspace_kept,
        exit_code: execution_exit_code(error),
    });
}

/// True for the two failures the one-shot dictionary-refresh retry covers
fn is_integrity_failure(error: &Error) -> bool {
    matches!(
        error,
        Error::Batch(BatchError::CorruptCapture { .. })
            | Error::Batch(BatchError::DictionaryMismatch { .. })
    )
}

/// Map an execute-or-verify error to the stage that was being attempted
fn failure_stage(error: &Error) -> Stage {
    match error {
        Error::Batch(BatchError::CorruptCapture { .. }) => Stage::Verified,
        _ => Stage::Executed,
    }
}

fn execution_exit_code(error: &Error) -> Option<i32> {
    match error {
        Error::Batch(BatchError::ExecutionFailed { code }) => Some(*code),
        _ => None,
    }
}
