//! Coordinator HTTP client
//!
//! The coordinator hands out batches of targets, publishes the shared
//! compression dictionary, assigns upload targets, and records completion.
//! All calls go through [`transfer_with_retry`], so transient transport
//! failures and server-side errors are retried with backoff before they
//! surface to the pipeline.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, RetryConfig};
use crate::dictionary::{DictionaryDescriptor, DictionarySource};
use crate::error::{Error, Result, TrackerError};
use crate::retry::transfer_with_retry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UploadTargetResponse {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Serialize)]
struct DonePayload<'a> {
    targets: &'a [String],
    bytes: &'a HashMap<String, u64>,
    downloader: &'a str,
    version: &'a str,
}

/// Client for the batch coordinator
#[derive(Clone, Debug)]
pub struct TrackerClient {
    client: reqwest::Client,
    base_url: String,
    project: String,
    downloader: String,
    version: String,
    batch_size: u32,
    retry: RetryConfig,
}

impl TrackerClient {
    /// Create a client from the tracker section of `config`
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("warc-pipeline/{}", config.tracker.version))
            .build()?;

        Ok(Self {
            client,
            base_url: config.tracker.base_url.trim_end_matches('/').to_string(),
            project: config.tracker.project.clone(),
            downloader: config.tracker.downloader.clone(),
            version: config.tracker.version.clone(),
            batch_size: config.tracker.batch_size,
            retry: config.retry.clone(),
        })
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/{}/{path}", self.base_url, self.project)
    }

    fn ensure_success(endpoint: &str, response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TrackerError::BadStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            }
            .into())
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        Self::ensure_success(endpoint, &response)?;
        response.json::<T>().await.map_err(|e| {
            Error::Tracker(TrackerError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Ask the coordinator for the next batch of targets
    ///
    /// Returns `None` when no work is available (a 204 or an empty target
    /// list); the caller is expected to back off and poll again.
    pub async fn request_batch(&self) -> Result<Option<Vec<String>>> {
        debug!(count = self.batch_size, "Requesting batch from coordinator");
        let assignment = transfer_with_retry(&self.retry, || self.request_batch_once()).await?;

        match &assignment {
            Some(targets) => info!(targets = targets.len(), "Received batch assignment"),
            None => debug!("No work available"),
        }
        Ok(assignment)
    }

    async fn request_batch_once(&self) -> Result<Option<Vec<String>>> {
        let count = self.batch_size.to_string();
        let response = self
            .client
            .get(self.project_url("batch"))
            .query(&[
                ("count", count.as_str()),
                ("downloader", self.downloader.as_str()),
                ("version", self.version.as_str()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body: BatchResponse = Self::read_json("batch", response).await?;
        if body.targets.is_empty() {
            Ok(None)
        } else {
            Ok(Some(body.targets))
        }
    }

    /// Send the pre-upload stats payload
    pub async fn send_report<P: Serialize + Sync + ?Sized>(&self, payload: &P) -> Result<()> {
        transfer_with_retry(&self.retry, || async {
            let response = self
                .client
                .post(self.project_url("report"))
                .json(payload)
                .send()
                .await?;
            Self::ensure_success("report", &response)
        })
        .await
    }

    /// Ask the coordinator where the finished artifacts should be uploaded
    pub async fn upload_target(&self) -> Result<String> {
        let url = transfer_with_retry(&self.retry, || self.upload_target_once()).await?;
        info!(url = %url, "Assigned upload target");
        Ok(url)
    }

    async fn upload_target_once(&self) -> Result<String> {
        let response = self
            .client
            .post(self.project_url("upload"))
            .query(&[
                ("downloader", self.downloader.as_str()),
                ("version", self.version.as_str()),
            ])
            .send()
            .await?;

        let body: UploadTargetResponse = Self::read_json("upload", response).await?;
        if body.url.is_empty() {
            return Err(TrackerError::NoUploadTarget(format!(
                "coordinator returned an empty url for {}",
                self.project
            ))
            .into());
        }
        Ok(body.url)
    }

    /// Report a batch as finished, with the targets that survived pruning
    /// and the uploaded byte counts
    pub async fn mark_done(&self, targets: &[String], bytes: &HashMap<String, u64>) -> Result<()> {
        transfer_with_retry(&self.retry, || async {
            let payload = DonePayload {
                targets,
                bytes,
                downloader: &self.downloader,
                version: &self.version,
            };
            let response = self
                .client
                .post(self.project_url("done"))
                .json(&payload)
                .send()
                .await?;
            Self::ensure_success("done", &response)
        })
        .await?;

        info!(targets = targets.len(), "Reported batch completion");
        Ok(())
    }
}

#[async_trait]
impl DictionarySource for TrackerClient {
    async fn dictionary_descriptor(&self) -> Result<DictionaryDescriptor> {
        transfer_with_retry(&self.retry, || async {
            let response = self
                .client
                .get(format!("{}/dictionary", self.base_url))
                .query(&[("project", self.project.as_str())])
                .send()
                .await?;
            Self::read_json("dictionary", response).await
        })
        .await
    }

    async fn fetch_dictionary_blob(&self, url: &str) -> Result<Vec<u8>> {
        transfer_with_retry(&self.retry, || async {
            let response = self.client.get(url).send().await?;
            Self::ensure_success("dictionary blob", &response)?;
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }
}
