//! Completion polling for submitted jobs.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use uqw_artifact::ArtifactWriter;
use uqw_client::ScanService;
use uqw_core::{Job, JobStatus, OutputPolicy, PollSettings};

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Analysis finished; artifacts are fetched by `report_id`.
    Done { report_id: String },
    Failed,
    /// The configured attempt or duration bound ran out first.
    TimedOut { attempts: u32 },
}

/// Polls one job's status until it is terminal, then hands it to the writer.
///
/// Pollers share nothing but the client and the writer; each runs on its own task.
#[derive(Clone)]
pub struct CompletionPoller {
    service: Arc<dyn ScanService>,
    writer: Arc<ArtifactWriter>,
    settings: PollSettings,
}

impl CompletionPoller {
    pub fn new(
        service: Arc<dyn ScanService>,
        writer: Arc<ArtifactWriter>,
        settings: PollSettings,
    ) -> Self {
        Self {
            service,
            writer,
            settings,
        }
    }

    /// Poll until terminal and write artifacts on success.
    pub async fn run(&self, job: &Job, policy: &OutputPolicy) -> PollOutcome {
        let outcome = self.wait(job).await;
        match &outcome {
            PollOutcome::Done { report_id } => {
                info!(
                    queue_id = %job.queue_id,
                    report_id = %report_id,
                    url = %job.url,
                    source = %job.source,
                    "analysis done"
                );
                self.writer.write(report_id, policy).await;
            }
            PollOutcome::Failed => {
                warn!(queue_id = %job.queue_id, url = %job.url, source = %job.source, "analysis failed");
            }
            PollOutcome::TimedOut { attempts } => {
                warn!(
                    queue_id = %job.queue_id,
                    url = %job.url,
                    source = %job.source,
                    attempts,
                    "gave up waiting for analysis"
                );
            }
        }
        outcome
    }

    /// Query status immediately, then once per interval, until terminal.
    ///
    /// Failed status queries count as attempts but are otherwise ignored.
    pub async fn wait(&self, job: &Job) -> PollOutcome {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            if let Some(max) = self.settings.max_attempts {
                if attempts >= max {
                    return PollOutcome::TimedOut { attempts };
                }
            }

            ticker.tick().await;

            if let Some(max) = self.settings.max_duration() {
                if started.elapsed() >= max {
                    return PollOutcome::TimedOut { attempts };
                }
            }

            attempts += 1;
            match self.service.queue_status(&job.queue_id).await {
                Ok(status) => match status.status {
                    JobStatus::Done => {
                        let report_id = status
                            .report_id
                            .unwrap_or_else(|| job.queue_id.clone());
                        return PollOutcome::Done { report_id };
                    }
                    JobStatus::Failed => return PollOutcome::Failed,
                    JobStatus::Pending => {
                        debug!(queue_id = %job.queue_id, attempts, "analysis pending");
                    }
                },
                Err(e) => {
                    debug!(queue_id = %job.queue_id, error = %e, "status query failed, retrying");
                }
            }
        }
    }
}
