//! Job lifecycle types shared by the poller and the webhook receiver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One submitted URL, tracked until its analysis reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Queue id issued by the remote service on submit.
    pub queue_id: String,
    /// The submitted URL.
    pub url: String,
    /// Watched file the URL was read from.
    pub source: String,
}

/// Analysis state of a job as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    /// Map a remote status string. Anything that is not `done` or `failed`
    /// (`queued`, `processing`, ...) is still pending.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status response for a queued submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub status: JobStatus,
    /// Report id assigned once analysis finishes.
    pub report_id: Option<String>,
    pub url: Option<String>,
}

impl QueueStatus {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            report_id: None,
            url: None,
        }
    }

    pub fn done(report_id: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Done,
            report_id: Some(report_id.into()),
            url: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: JobStatus::Failed,
            report_id: None,
            url: None,
        }
    }
}

/// Event kinds the remote service pushes to the webhook endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Completed,
    Alerted,
}

impl EventKind {
    /// Parse the `event` query value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(EventKind::Completed),
            "alerted" => Some(EventKind::Alerted),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Completed => write!(f, "completed"),
            EventKind::Alerted => write!(f, "alerted"),
        }
    }
}

/// A parsed push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub report_id: String,
    pub kind: EventKind,
}

impl WebhookEvent {
    /// Build an event from raw query values.
    ///
    /// Returns `None` for unknown or missing event kinds, and for report ids
    /// that are empty or could escape the output directory or API path.
    pub fn from_query(report_id: Option<&str>, event: Option<&str>) -> Option<Self> {
        let kind = EventKind::parse(event?)?;
        let report_id = report_id.map(str::trim).filter(|id| is_plain_id(id))?;
        Some(Self {
            report_id: report_id.to_string(),
            kind,
        })
    }
}

/// Non-empty, no path separators, no `..`.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
}
