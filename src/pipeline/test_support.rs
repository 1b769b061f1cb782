//! Shared fixtures for pipeline unit tests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::config::Config;
use crate::crawl::{CrawlRunner, InvocationSpec};
use crate::error::Result;
use crate::report::Uploader;

use super::Pipeline;

/// Crawl stand-in that exits 0 without touching the workspace
pub(crate) struct StubRunner;

#[async_trait]
impl CrawlRunner for StubRunner {
    async fn run(&self, _spec: &InvocationSpec) -> Result<i32> {
        Ok(0)
    }
}

/// Upload stand-in that accepts everything
pub(crate) struct StubUploader;

#[async_trait]
impl Uploader for StubUploader {
    async fn upload(&self, _target: &str, _files: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

/// Assemble a pipeline over temp storage with stubbed crawl and upload
///
/// The tracker base URL points at an unroutable host, so any test that
/// reaches the wire fails fast instead of hanging. Callers adjust the
/// config through the closure before assembly and must keep the returned
/// [`TempDir`] alive for the pipeline's lifetime.
pub(crate) async fn test_pipeline(adjust: impl FnOnce(&mut Config)) -> (Pipeline, TempDir) {
    let root = TempDir::new().unwrap();
    let mut config = Config::default();
    config.tracker.base_url = "http://tracker.invalid".to_string();
    config.tracker.downloader = "tester".to_string();
    config.tracker.poll_delay = Duration::from_millis(25);
    config.storage.data_root = root.path().join("data");
    config.storage.final_root = Some(root.path().join("finished"));
    config.crawl.script_path = root.path().join("glitch.lua");
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.jitter = false;
    config.skip_env_check = true;
    adjust(&mut config);

    tokio::fs::write(&config.crawl.script_path, b"-- crawl script\n")
        .await
        .unwrap();

    let pipeline = Pipeline::with_components(config, Arc::new(StubRunner), Arc::new(StubUploader))
        .await
        .expect("test pipeline must assemble");
    (pipeline, root)
}
