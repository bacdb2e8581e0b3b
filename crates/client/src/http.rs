//! reqwest-backed [`ScanService`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use uqw_core::{ArtifactKind, JobStatus, QueueStatus};

use crate::error::ClientError;
use crate::service::{ScanService, SubmitRequest, Submission, UserInfo};

const API_KEY_HEADER: &str = "X-APIKEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the analysis service's public v1 API.
#[derive(Debug, Clone)]
pub struct HttpScanService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    report_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl HttpScanService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ClientError::Config("empty API key".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("uqw/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/public/v1/{}", self.base_url, path)
    }

    fn artifact_path(kind: ArtifactKind, report_id: &str) -> String {
        match kind {
            ArtifactKind::Report => format!("report/{report_id}"),
            ArtifactKind::Screenshot => format!("report/{report_id}/screenshot"),
            ArtifactKind::DomainGraph => format!("report/{report_id}/domain_graph"),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let url = self.endpoint(path);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ScanService for HttpScanService {
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, ClientError> {
        let url = self.endpoint("submit/url");
        debug!(url = %url, target = %request.url, "submitting URL");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let submission: Submission = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("submit response: {e}")))?;
        if submission.queue_id.is_empty() {
            return Err(ClientError::Parse("submit response has empty queue_id".into()));
        }
        Ok(submission)
    }

    async fn queue_status(&self, queue_id: &str) -> Result<QueueStatus, ClientError> {
        let response = self.get(&format!("submit/status/{queue_id}")).await?;
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("status response: {e}")))?;

        Ok(QueueStatus {
            status: JobStatus::from_remote(&body.status),
            report_id: body.report_id.filter(|id| !id.is_empty()),
            url: body.url,
        })
    }

    async fn artifact(&self, kind: ArtifactKind, report_id: &str) -> Result<Bytes, ClientError> {
        let response = self.get(&Self::artifact_path(kind, report_id)).await?;
        Ok(response.bytes().await?)
    }

    async fn user(&self) -> Result<UserInfo, ClientError> {
        let response = self.get("user").await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("user response: {e}")))
    }
}
