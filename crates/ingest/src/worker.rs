//! File ingestion worker: one per enabled submission source.
//!
//! The worker tails its watched file and submits every appended line, in
//! order, with the source's submission parameters. Submit failures are logged
//! and skipped. When the source's output policy is enabled, each accepted
//! submission gets a detached [`CompletionPoller`]; ingestion never waits on it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use uqw_artifact::ArtifactWriter;
use uqw_client::{ScanService, SubmitRequest};
use uqw_core::{Job, PollSettings, SubmitterSettings};

use crate::error::IngestError;
use crate::poller::CompletionPoller;
use crate::tail::{ChangeWatcher, FileTailer};

pub struct IngestWorker {
    source: SubmitterSettings,
    service: Arc<dyn ScanService>,
    writer: Arc<ArtifactWriter>,
    poll: PollSettings,
    tail_interval: Duration,
}

impl IngestWorker {
    pub fn new(
        source: SubmitterSettings,
        service: Arc<dyn ScanService>,
        writer: Arc<ArtifactWriter>,
        poll: PollSettings,
        tail_interval: Duration,
    ) -> Self {
        Self {
            source,
            service,
            writer,
            poll,
            tail_interval,
        }
    }

    /// Create the watched file if it is missing. Never truncates.
    pub fn prepare(path: &Path) -> Result<(), IngestError> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
            .map_err(|source| IngestError::Prepare {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Position at the end of the watched file and spawn the ingestion loop.
    ///
    /// Everything appended after this returns is submitted. The loop stops once
    /// `shutdown` flips to `true` or its sender is dropped.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>, IngestError> {
        let path = self.source.file.clone();
        if let Err(e) = Self::prepare(&path) {
            // The tailer picks the file up once someone else creates it.
            warn!(path = %path.display(), error = %e, "could not create watched file");
        }

        let tailer = FileTailer::open_at_end(&path).await?;
        let watcher = match ChangeWatcher::new(&path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "filesystem watcher unavailable, polling only");
                None
            }
        };

        info!(path = %path.display(), output = self.source.output.enabled, "ingest worker started");
        Ok(tokio::spawn(self.run(tailer, watcher, shutdown)))
    }

    async fn run(
        self,
        mut tailer: FileTailer,
        mut watcher: Option<ChangeWatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.tail_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
                Some(()) = next_change(&mut watcher) => {}
            }

            match tailer.read_lines().await {
                Ok(lines) => {
                    for line in lines {
                        self.submit(line).await;
                    }
                }
                Err(e) => {
                    warn!(path = %tailer.path().display(), error = %e, "failed to read watched file");
                }
            }
        }

        info!(path = %self.source.file.display(), "ingest worker stopped");
    }

    async fn submit(&self, url: String) {
        let request = SubmitRequest::new(url.clone(), &self.source.settings);
        let submission = match self.service.submit(&request).await {
            Ok(s) => s,
            Err(e) => {
                warn!(url = %url, error = %e, "submission failed");
                return;
            }
        };

        info!(queue_id = %submission.queue_id, url = %url, "submitted url");

        if !self.source.output.enabled {
            return;
        }

        let job = Job {
            queue_id: submission.queue_id,
            url,
            source: self.source.file.display().to_string(),
        };
        let poller = CompletionPoller::new(
            Arc::clone(&self.service),
            Arc::clone(&self.writer),
            self.poll.clone(),
        );
        let policy = self.source.output.clone();
        tokio::spawn(async move {
            poller.run(&job, &policy).await;
        });
    }
}

async fn next_change(watcher: &mut Option<ChangeWatcher>) -> Option<()> {
    match watcher {
        Some(w) => w.changed().await,
        None => std::future::pending().await,
    }
}
