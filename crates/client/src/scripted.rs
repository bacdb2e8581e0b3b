//! In-memory [`ScanService`] with scripted responses and call recording.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use uqw_core::{ArtifactKind, QueueStatus};

use crate::error::ClientError;
use crate::service::{ScanService, SubmitRequest, Submission, UserInfo, UserWebhook};

/// Scriptable stand-in for the remote service.
///
/// - submits succeed with ids `queue-1`, `queue-2`, ... unless the URL was
///   marked with [`ScriptedService::fail_submit`]
/// - status queries pop from a per-queue script; the last entry repeats, and an
///   unscripted queue reports pending forever
/// - artifacts default to `"<kind>:<report_id>"`; a scripted sequence pops
///   one payload per fetch and repeats its last entry
#[derive(Default)]
pub struct ScriptedService {
    next_id: AtomicUsize,
    failing_urls: Mutex<HashSet<String>>,
    statuses: Mutex<HashMap<String, VecDeque<Result<QueueStatus, String>>>>,
    artifacts: Mutex<HashMap<(ArtifactKind, String), VecDeque<Bytes>>>,
    fetch_delay: Mutex<Option<Duration>>,
    failing_artifacts: Mutex<HashSet<ArtifactKind>>,
    submissions: Mutex<Vec<SubmitRequest>>,
    status_queries: Mutex<Vec<String>>,
    fetches: Mutex<Vec<(ArtifactKind, String)>>,
    webhook: Mutex<Option<UserWebhook>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submit(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    /// Append status responses for a queue id.
    pub fn script_status(&self, queue_id: &str, responses: impl IntoIterator<Item = QueueStatus>) {
        let mut statuses = self.statuses.lock().unwrap();
        let script = statuses.entry(queue_id.to_string()).or_default();
        script.extend(responses.into_iter().map(Ok));
    }

    /// Append a failing status query for a queue id.
    pub fn script_status_error(&self, queue_id: &str) {
        let mut statuses = self.statuses.lock().unwrap();
        statuses
            .entry(queue_id.to_string())
            .or_default()
            .push_back(Err("scripted status failure".to_string()));
    }

    pub fn set_artifact(&self, kind: ArtifactKind, report_id: &str, data: impl Into<Bytes>) {
        self.script_artifacts(kind, report_id, [data.into()]);
    }

    /// Serve `payloads` to successive fetches of one artifact.
    pub fn script_artifacts(
        &self,
        kind: ArtifactKind,
        report_id: &str,
        payloads: impl IntoIterator<Item = Bytes>,
    ) {
        self.artifacts
            .lock()
            .unwrap()
            .insert((kind, report_id.to_string()), payloads.into_iter().collect());
    }

    /// Hold every artifact fetch for `delay` before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_artifact(&self, kind: ArtifactKind) {
        self.failing_artifacts.lock().unwrap().insert(kind);
    }

    pub fn set_user_webhook(&self, url: &str, enabled: bool) {
        *self.webhook.lock().unwrap() = Some(UserWebhook {
            url: url.to_string(),
            enabled,
        });
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitted_urls(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.url).collect()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.status_queries.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<(ArtifactKind, String)> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanService for ScriptedService {
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, ClientError> {
        self.submissions.lock().unwrap().push(request.clone());
        if self.failing_urls.lock().unwrap().contains(&request.url) {
            return Err(ClientError::Api {
                status: 400,
                body: format!("rejected {}", request.url),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Submission {
            queue_id: format!("queue-{n}"),
        })
    }

    async fn queue_status(&self, queue_id: &str) -> Result<QueueStatus, ClientError> {
        self.status_queries.lock().unwrap().push(queue_id.to_string());
        let mut statuses = self.statuses.lock().unwrap();
        let Some(script) = statuses.get_mut(queue_id) else {
            return Ok(QueueStatus::pending());
        };
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(msg)) => Err(ClientError::Api { status: 503, body: msg }),
            None => Ok(QueueStatus::pending()),
        }
    }

    async fn artifact(&self, kind: ArtifactKind, report_id: &str) -> Result<Bytes, ClientError> {
        self.fetches.lock().unwrap().push((kind, report_id.to_string()));
        if self.failing_artifacts.lock().unwrap().contains(&kind) {
            return Err(ClientError::Api {
                status: 500,
                body: format!("{kind} unavailable"),
            });
        }
        let stored = {
            let mut artifacts = self.artifacts.lock().unwrap();
            artifacts
                .get_mut(&(kind, report_id.to_string()))
                .and_then(|script| {
                    if script.len() > 1 {
                        script.pop_front()
                    } else {
                        script.front().cloned()
                    }
                })
        };
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(stored.unwrap_or_else(|| Bytes::from(format!("{kind}:{report_id}"))))
    }

    async fn user(&self) -> Result<UserInfo, ClientError> {
        match self.webhook.lock().unwrap().clone() {
            Some(webhook) => {
                let mut info = UserInfo::default();
                info.notify.webhook = webhook;
                Ok(info)
            }
            None => Err(ClientError::Api {
                status: 401,
                body: "no user scripted".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uqw_core::{JobStatus, SubmissionParams};

    #[tokio::test]
    async fn status_script_repeats_last_entry() {
        let svc = ScriptedService::new();
        svc.script_status("q", [QueueStatus::pending(), QueueStatus::done("r")]);

        assert_eq!(svc.queue_status("q").await.unwrap().status, JobStatus::Pending);
        assert_eq!(svc.queue_status("q").await.unwrap().status, JobStatus::Done);
        assert_eq!(svc.queue_status("q").await.unwrap().status, JobStatus::Done);
        assert_eq!(svc.status_queries().len(), 3);
    }

    #[tokio::test]
    async fn artifact_script_pops_then_repeats() {
        let svc = ScriptedService::new();
        svc.script_artifacts(
            ArtifactKind::Report,
            "r",
            [Bytes::from_static(b"one"), Bytes::from_static(b"two")],
        );

        assert_eq!(svc.artifact(ArtifactKind::Report, "r").await.unwrap(), "one");
        assert_eq!(svc.artifact(ArtifactKind::Report, "r").await.unwrap(), "two");
        assert_eq!(svc.artifact(ArtifactKind::Report, "r").await.unwrap(), "two");
        assert_eq!(svc.artifact(ArtifactKind::Screenshot, "r").await.unwrap(), "screenshot:r");
    }

    #[tokio::test]
    async fn failing_submit_still_recorded() {
        let svc = ScriptedService::new();
        svc.fail_submit("https://bad.example");
        let params = SubmissionParams::default();

        assert!(svc.submit(&SubmitRequest::new("https://bad.example", &params)).await.is_err());
        let ok = svc
            .submit(&SubmitRequest::new("https://good.example", &params))
            .await
            .unwrap();
        assert_eq!(ok.queue_id, "queue-1");
        assert_eq!(svc.submitted_urls().len(), 2);
    }
}
