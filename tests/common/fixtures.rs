//! Pipeline fixtures: a scripted crawl runner, a recording uploader, and a
//! builder that wires a pipeline to temp storage

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use warc_pipeline::{Config, CrawlRunner, InvocationSpec, Pipeline, Result, Uploader};

/// Dictionary bytes the mock coordinator serves
pub const DICTIONARY: &[u8] = b"WARC/1.1 shared dictionary for end-to-end captures";

/// Compress `payload` the way the crawl process would, bound to `dictionary`
pub fn compress_with_dictionary(dictionary: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut encoder = zstd::stream::write::Encoder::with_dictionary(Vec::new(), 3, dictionary)
        .expect("encoder setup failed");
    encoder.write_all(payload).expect("payload write failed");
    encoder.finish().expect("encoder finish failed")
}

/// What one scripted crawl attempt does to its workspace
#[derive(Clone)]
pub enum RunBehavior {
    /// Write a capture that decompresses cleanly under the workspace
    /// dictionary plus a line-per-entry aborted list, then exit 0
    Capture {
        payload: Vec<u8>,
        aborted: Vec<String>,
    },
    /// Write bytes that are not a zstd stream, then exit 0
    Corrupt,
    /// Touch nothing and exit with the given code
    ExitOnly(i32),
}

/// Crawl stand-in that fabricates the files wget-at would leave behind
///
/// Behaviors are consumed in order; the last one repeats if the crawl runs
/// more often than scripted. Workspace paths are derived from the
/// invocation's environment, the same way the real crawl script finds them.
pub struct ScriptedRunner {
    behaviors: StdMutex<Vec<RunBehavior>>,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(behaviors: Vec<RunBehavior>) -> Arc<Self> {
        assert!(
            !behaviors.is_empty(),
            "scripted runner needs at least one behavior"
        );
        Arc::new(Self {
            behaviors: StdMutex::new(behaviors),
            calls: AtomicUsize::new(0),
        })
    }

    /// One behavior: a clean capture of `payload` with nothing aborted
    pub fn happy(payload: &[u8]) -> Arc<Self> {
        Self::new(vec![RunBehavior::Capture {
            payload: payload.to_vec(),
            aborted: Vec::new(),
        }])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrawlRunner for ScriptedRunner {
    async fn run(&self, spec: &InvocationSpec) -> Result<i32> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let behaviors = self.behaviors.lock().unwrap();
            behaviors
                .get(index)
                .or_else(|| behaviors.last())
                .cloned()
                .expect("behaviors are checked non-empty at construction")
        };

        let env: HashMap<&str, &str> = spec
            .env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let item_dir = PathBuf::from(env["item_dir"]);
        let base = env["warc_file_base"];
        let capture = item_dir.join(format!("{base}.warc.zst"));

        match behavior {
            RunBehavior::Capture { payload, aborted } => {
                let dictionary = tokio::fs::read(item_dir.join("zstdict"))
                    .await
                    .expect("dictionary must be materialized before the crawl");
                tokio::fs::write(&capture, compress_with_dictionary(&dictionary, &payload))
                    .await
                    .unwrap();
                tokio::fs::write(item_dir.join(format!("{base}_data.txt")), b"side channel\n")
                    .await
                    .unwrap();
                if !aborted.is_empty() {
                    let mut lines = aborted.join("\n");
                    lines.push('\n');
                    tokio::fs::write(item_dir.join(format!("{base}_bad-items.txt")), lines)
                        .await
                        .unwrap();
                }
                Ok(0)
            }
            RunBehavior::Corrupt => {
                tokio::fs::write(&capture, b"these bytes are not a zstd stream")
                    .await
                    .unwrap();
                Ok(0)
            }
            RunBehavior::ExitOnly(code) => Ok(code),
        }
    }
}

/// Upload stand-in that records every call and always succeeds
#[derive(Default)]
pub struct CountingUploader {
    uploads: StdMutex<Vec<(String, Vec<PathBuf>)>>,
}

impl CountingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn uploads(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl Uploader for CountingUploader {
    async fn upload(&self, target: &str, files: &[PathBuf]) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((target.to_string(), files.to_vec()));
        Ok(())
    }
}

/// Build a single-worker pipeline over temp storage against `coordinator_url`
///
/// Polling and retry delays are shortened so tests stay fast; the returned
/// [`TempDir`] must outlive the pipeline.
pub async fn build_pipeline(
    coordinator_url: &str,
    runner: Arc<ScriptedRunner>,
    uploader: Arc<CountingUploader>,
) -> (Pipeline, TempDir) {
    build_pipeline_with(coordinator_url, runner, uploader, |_| {}).await
}

/// [`build_pipeline`] with a config adjustment hook
pub async fn build_pipeline_with(
    coordinator_url: &str,
    runner: Arc<dyn CrawlRunner>,
    uploader: Arc<dyn Uploader>,
    adjust: impl FnOnce(&mut Config),
) -> (Pipeline, TempDir) {
    let root = TempDir::new().expect("temp dir creation failed");
    let mut config = Config::default();
    config.tracker.base_url = coordinator_url.to_string();
    config.tracker.downloader = "tester".to_string();
    config.tracker.poll_delay = Duration::from_millis(25);
    config.storage.data_root = root.path().join("data");
    config.storage.final_root = Some(root.path().join("finished"));
    config.crawl.script_path = root.path().join("glitch.lua");
    config.workers = 1;
    config.skip_env_check = true;
    config.retry.max_attempts = 2;
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    adjust(&mut config);

    tokio::fs::write(&config.crawl.script_path, b"-- crawl script\n")
        .await
        .expect("script write failed");

    let pipeline = Pipeline::with_components(config, runner, uploader)
        .await
        .expect("pipeline must assemble");
    (pipeline, root)
}
