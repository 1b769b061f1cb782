//! External crawl process integration
//!
//! A batch is captured by handing an argument list to the wget-at
//! executable. [`build_invocation`] derives that list from the batch,
//! workspace, and configuration; [`CrawlRunner`] is the seam through which
//! the pipeline starts the process, with [`CliCrawlRunner`] as the real
//! implementation.

/// Invocation building
pub mod args;
mod cli;

pub use args::{InvocationSpec, build_invocation, logic_hash};
pub use cli::{CliCrawlRunner, locate_crawl_executable};

use async_trait::async_trait;

use crate::error::Result;

/// Exit codes that leave a usable capture behind
///
/// 4 and 8 are wget's network-failure and server-error exits. Targets that
/// failed under those codes are reported in the aborted list and pruned, so
/// the capture itself is still good.
pub const ACCEPTED_EXIT_CODES: [i32; 3] = [0, 4, 8];

/// Runs a prepared crawl invocation to completion
#[async_trait]
pub trait CrawlRunner: Send + Sync {
    /// Start the process described by `spec`, wait for it to exit, and
    /// return its exit code
    async fn run(&self, spec: &InvocationSpec) -> Result<i32>;
}
