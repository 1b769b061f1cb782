//! CLI-based crawl runner
//!
//! Executes the wget-at binary as a child process. The binary is located
//! through an explicit configuration path or a PATH lookup.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::CrawlConfig;
use crate::crawl::{CrawlRunner, InvocationSpec};
use crate::error::{Error, Result};

/// Names tried during PATH lookup, in order
const EXECUTABLE_CANDIDATES: [&str; 2] = ["wget-at", "wget-lua"];

/// Locate the crawl executable
///
/// An explicit `executable_path` wins and must exist; otherwise the
/// candidates are searched on PATH when `search_path` allows it.
///
/// # Errors
/// Returns [`Error::Environment`] when no usable executable is found, since
/// the pipeline cannot process any batch without one.
pub fn locate_crawl_executable(config: &CrawlConfig) -> Result<PathBuf> {
    if let Some(path) = &config.executable_path {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(Error::Environment(format!(
            "configured crawl executable does not exist: {}",
            path.display()
        )));
    }

    if config.search_path {
        for candidate in EXECUTABLE_CANDIDATES {
            if let Ok(path) = which::which(candidate) {
                debug!(executable = %path.display(), "Located crawl executable");
                return Ok(path);
            }
        }
    }

    Err(Error::Environment(format!(
        "no crawl executable found; tried {}",
        EXECUTABLE_CANDIDATES.join(", ")
    )))
}

/// Runs crawl invocations as child processes
#[derive(Clone, Copy, Debug, Default)]
pub struct CliCrawlRunner;

impl CliCrawlRunner {
    /// Build a runner
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CrawlRunner for CliCrawlRunner {
    async fn run(&self, spec: &InvocationSpec) -> Result<i32> {
        info!(
            executable = %spec.executable.display(),
            args = spec.args.len(),
            "Starting crawl process"
        );

        let mut command = Command::new(&spec.executable);
        command.args(&spec.args).kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        // The process logs to its in-workspace file; stdout and stderr stay
        // small under -nv.
        let output = command.output().await.map_err(|e| {
            Error::ExternalTool(format!(
                "Failed to execute {}: {}",
                spec.executable.display(),
                e
            ))
        })?;

        match output.status.code() {
            Some(code) => {
                info!(code, "Crawl process exited");
                Ok(code)
            }
            None => Err(Error::ExternalTool(
                "crawl process was terminated by a signal".to_string(),
            )),
        }
    }
}
