//! Aborted-target pruning
//!
//! The crawl script reports targets it gave up on in a bad-items file inside
//! the workspace. Those targets are removed from the batch before the final
//! report, so the coordinator re-queues them instead of marking them done.
//! Matching runs on normalized forms (repeated percent-decoding, trimmed,
//! lowercased) because the script may echo names in a different casing or
//! encoding than the coordinator handed out.

use std::collections::BTreeSet;
use std::io::ErrorKind;

use tracing::info;

use crate::error::{BatchError, Result};
use crate::types::Batch;
use crate::utils::normalize;
use crate::workspace::Workspace;

/// Read the aborted-target list left behind by the crawl process
///
/// A missing file means nothing was aborted. Blank lines are ignored.
pub async fn load_aborted(workspace: &Workspace) -> Result<Vec<String>> {
    match tokio::fs::read_to_string(workspace.bad_items_path()).await {
        Ok(contents) => Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Remove aborted targets from `batch`
///
/// Aborted entries are de-duplicated after normalization; each distinct
/// entry removes the first target whose normalized name matches it. An entry
/// that matches no target is a protocol inconsistency between the crawl
/// script and the batch, and fails the batch rather than being ignored.
/// Pruning every target is valid; the caller handles the empty batch.
pub fn prune(batch: &mut Batch, aborted: &[String]) -> std::result::Result<(), BatchError> {
    if aborted.is_empty() {
        return Ok(());
    }

    let mut normalized: Vec<String> = batch
        .targets
        .iter()
        .map(|target| normalize(&target.name()))
        .collect();

    let distinct: BTreeSet<String> = aborted
        .iter()
        .map(|entry| normalize(entry))
        .filter(|entry| !entry.is_empty())
        .collect();

    for entry in distinct {
        match normalized.iter().position(|name| *name == entry) {
            Some(index) => {
                info!(target = %batch.targets[index].name(), "Item is aborted");
                batch.targets.remove(index);
                normalized.remove(index);
            }
            None => return Err(BatchError::PruneMismatch { entry }),
        }
    }
    Ok(())
}
