//! Event-stream assertions for E2E tests

use std::time::Duration;

use tokio::sync::broadcast::Receiver;
use warc_pipeline::{Event, FailureDisposition, Stage};

/// Terminal outcome of one batch as seen on the event stream
#[derive(Debug)]
pub enum BatchOutcome {
    /// `BatchComplete` observed
    Completed {
        workspace_hash: String,
        reported_targets: usize,
    },
    /// `BatchFailed` observed
    Failed {
        workspace_hash: String,
        stage: Stage,
        disposition: FailureDisposition,
        workspace_kept: bool,
        exit_code: Option<i32>,
        error: String,
    },
    /// No terminal event within the timeout
    Timeout,
    /// Event channel closed before a terminal event
    ChannelClosed,
}

/// Wait for the next terminal batch event (complete or failed)
pub async fn wait_for_batch_outcome(
    events: &mut Receiver<Event>,
    timeout: Duration,
) -> BatchOutcome {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::BatchComplete {
                    workspace_hash,
                    reported_targets,
                }) => {
                    return BatchOutcome::Completed {
                        workspace_hash,
                        reported_targets,
                    };
                }
                Ok(Event::BatchFailed {
                    workspace_hash,
                    stage,
                    error,
                    disposition,
                    workspace_kept,
                    exit_code,
                }) => {
                    return BatchOutcome::Failed {
                        workspace_hash,
                        stage,
                        disposition,
                        workspace_kept,
                        exit_code,
                        error,
                    };
                }
                Ok(_) => continue,
                Err(_) => return BatchOutcome::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(BatchOutcome::Timeout)
}

/// Wait for the first event matching `predicate`, discarding earlier ones
pub async fn wait_for_event<F>(
    events: &mut Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Collect every event up to and including the first one matching
/// `predicate`
///
/// Panics on timeout, since the caller is about to assert on the collected
/// sequence anyway.
pub async fn collect_events_until<F>(
    events: &mut Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let collected = tokio::time::timeout(timeout, async {
        let mut collected = Vec::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = predicate(&event);
                    collected.push(event);
                    if done {
                        return collected;
                    }
                }
                Err(_) => return collected,
            }
        }
    })
    .await;

    collected.expect("timed out waiting for the target event")
}

/// True for the two terminal batch events
pub fn is_terminal(event: &Event) -> bool {
    matches!(
        event,
        Event::BatchComplete { .. } | Event::BatchFailed { .. }
    )
}
