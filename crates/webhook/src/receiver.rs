//! Routes webhook events to the artifact writer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use uqw_artifact::{ArtifactWriter, WriteSummary};
use uqw_core::{EventKind, OutputPolicy, WebhookEvent, WebhookSettings};

/// Maps event kinds to output policies; fixed at construction.
pub struct WebhookReceiver {
    writer: Arc<ArtifactWriter>,
    /// Policy for `completed` events.
    submitted: OutputPolicy,
    /// Policy for `alerted` events.
    alerted: OutputPolicy,
    secret: Option<String>,
}

impl WebhookReceiver {
    pub fn new(writer: Arc<ArtifactWriter>, settings: &WebhookSettings) -> Self {
        Self {
            writer,
            submitted: settings.reports.submitted.clone(),
            alerted: settings.reports.alerted.clone(),
            secret: settings.secret.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn policy_for(&self, kind: EventKind) -> &OutputPolicy {
        match kind {
            EventKind::Completed => &self.submitted,
            EventKind::Alerted => &self.alerted,
        }
    }

    /// Whether a request presenting `token` may trigger writes.
    pub fn authorize(&self, token: Option<&str>) -> bool {
        match (&self.secret, token) {
            (None, _) => true,
            (Some(secret), Some(token)) => constant_time_eq(secret.as_bytes(), token.as_bytes()),
            (Some(_), None) => false,
        }
    }

    pub fn requires_token(&self) -> bool {
        self.secret.is_some()
    }

    /// Start a detached artifact write for `event`.
    ///
    /// The policy's `enabled` flag only gates polling for ingestion sources;
    /// pushed events always reach the writer, which writes the kinds the
    /// policy selects.
    pub fn dispatch(&self, event: &WebhookEvent) -> JoinHandle<WriteSummary> {
        let policy = self.policy_for(event.kind);
        info!(report_id = %event.report_id, event = %event.kind, "dispatching artifact write");
        self.writer.spawn(event.report_id.clone(), policy.clone())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
