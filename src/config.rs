//! Configuration types for warc-pipeline

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Coordinator (tracker) connection configuration
///
/// Groups settings for the service that assigns batches and receives
/// completion reports. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the coordinator (default: "https://legacy-api.arpa.li")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Project identifier, used in URL paths and dictionary lookups (default: "glitch")
    #[serde(default = "default_project")]
    pub project: String,

    /// Worker nickname sent with every coordinator call (default: "anonymous")
    #[serde(default = "default_downloader")]
    pub downloader: String,

    /// Pipeline version label reported to the coordinator
    ///
    /// Stale workers are detectable server-side through this label plus the
    /// logic hashes in the stats payload.
    #[serde(default = "default_version")]
    pub version: String,

    /// Number of targets to request per batch (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// How long to wait before polling again when no work is available (default: 30 seconds)
    #[serde(default = "default_poll_delay", with = "duration_serde")]
    pub poll_delay: Duration,

    /// How long a cached dictionary stays fresh without consulting the
    /// coordinator (default: 30 minutes)
    #[serde(default = "default_dictionary_ttl", with = "duration_serde")]
    pub dictionary_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project: default_project(),
            downloader: default_downloader(),
            version: default_version(),
            batch_size: default_batch_size(),
            poll_delay: default_poll_delay(),
            dictionary_ttl: default_dictionary_ttl(),
        }
    }
}

/// Crawl executable configuration
///
/// Groups settings for the external crawl process and the argument list it
/// is invoked with. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Path to the crawl executable (auto-detected if None)
    #[serde(default)]
    pub executable_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Path to the crawl script handed to the executable (default: "glitch.lua")
    ///
    /// Also content-hashed into the stats payload so the coordinator can
    /// detect workers running a stale script.
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,

    /// User-Agent string the crawl process presents
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Prefix for capture file base names (default: "glitch")
    #[serde(default = "default_warc_prefix")]
    pub warc_prefix: String,

    /// Parallelism hint passed through to the crawl process (default: 2)
    #[serde(default = "default_crawl_concurrency")]
    pub concurrency: u32,

    /// Local address to bind outgoing crawl connections to (default: unset)
    #[serde(default)]
    pub bind_address: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            search_path: true,
            script_path: default_script_path(),
            user_agent: default_user_agent(),
            warc_prefix: default_warc_prefix(),
            concurrency: default_crawl_concurrency(),
            bind_address: None,
        }
    }
}

/// Artifact upload configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Concurrent upload slots shared across all in-flight batches
    /// (default: 20; effective value is clamped to 1..=20)
    #[serde(default = "default_upload_slots")]
    pub slots: u32,

    /// Path to the rsync executable (auto-detected if None)
    #[serde(default)]
    pub rsync_path: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            slots: default_upload_slots(),
            rsync_path: None,
        }
    }
}

/// Workspace and artifact storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for per-batch workspaces (default: "data")
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Directory finished artifacts are relocated to before upload
    /// (default: unset, falls back to `data_root`)
    #[serde(default)]
    pub final_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            final_root: None,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration for the pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`tracker`](TrackerConfig) — coordinator endpoints, identity, polling
/// - [`crawl`](CrawlConfig) — external crawl process and argument inputs
/// - [`upload`](UploadConfig) — artifact transfer
/// - [`storage`](StorageConfig) — workspace and artifact directories
/// - [`retry`](RetryConfig) — backoff for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator connection settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Crawl executable settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Artifact upload settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Workspace and artifact storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry configuration for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Number of batches processed concurrently (default: 2)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Batches between environment self-checks (default: 10)
    #[serde(default = "default_env_check_interval")]
    pub env_check_interval: u32,

    /// Skip the DNS environment self-check entirely (default: false)
    ///
    /// For embedders running inside networks where the resolver is known
    /// good, and for hermetic tests.
    #[serde(default)]
    pub skip_env_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            crawl: CrawlConfig::default(),
            upload: UploadConfig::default(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
            workers: default_workers(),
            env_check_interval: default_env_check_interval(),
            skip_env_check: false,
        }
    }
}

// Convenience accessors for values that need interpretation beyond the
// raw field.
impl Config {
    /// Workspace root directory
    pub fn data_root(&self) -> &Path {
        &self.storage.data_root
    }

    /// Directory finished artifacts are relocated to, falling back to the
    /// workspace root when not configured separately
    pub fn final_root(&self) -> &Path {
        self.storage
            .final_root
            .as_deref()
            .unwrap_or(&self.storage.data_root)
    }

    /// Effective upload slot count, clamped to 1..=20
    pub fn upload_slots(&self) -> usize {
        self.upload.slots.clamp(1, 20) as usize
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://legacy-api.arpa.li".to_string()
}

fn default_project() -> String {
    "glitch".to_string()
}

fn default_downloader() -> String {
    "anonymous".to_string()
}

fn default_version() -> String {
    crate::VERSION.to_string()
}

fn default_batch_size() -> u32 {
    100
}

fn default_poll_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_dictionary_ttl() -> Duration {
    Duration::from_secs(1800) // 30 minutes
}

fn default_script_path() -> PathBuf {
    PathBuf::from("glitch.lua")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:136.0) Gecko/20100101 Firefox/136.0".to_string()
}

fn default_warc_prefix() -> String {
    "glitch".to_string()
}

fn default_crawl_concurrency() -> u32 {
    2
}

fn default_upload_slots() -> u32 {
    20
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_workers() -> usize {
    2
}

fn default_env_check_interval() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
