use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use uqw_core::{ArtifactKind, QueueStatus, SubmissionParams};

use crate::error::ClientError;

/// A URL to submit, with the source's submission parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitRequest {
    pub url: String,
    pub access: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl SubmitRequest {
    pub fn new(url: impl Into<String>, params: &SubmissionParams) -> Self {
        Self {
            url: url.into(),
            access: params.access.clone(),
            tags: params.tags.clone(),
            meta: params.meta.clone(),
        }
    }
}

/// Handle returned by a successful submit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Submission {
    pub queue_id: String,
}

/// Account details; only the webhook settings are used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub notify: UserNotify,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserNotify {
    #[serde(default)]
    pub webhook: UserWebhook,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserWebhook {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

/// The remote analysis service.
///
/// Implementations are shared across tasks and must not keep per-call state.
#[async_trait]
pub trait ScanService: Send + Sync {
    /// Queue a URL for analysis.
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, ClientError>;

    /// Current status of a queued submission.
    async fn queue_status(&self, queue_id: &str) -> Result<QueueStatus, ClientError>;

    /// Raw bytes of one artifact of a finished report.
    async fn artifact(&self, kind: ArtifactKind, report_id: &str) -> Result<Bytes, ClientError>;

    /// Account the API key belongs to.
    async fn user(&self) -> Result<UserInfo, ClientError>;
}
