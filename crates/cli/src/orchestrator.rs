//! Startup, supervision and bounded shutdown of the ingestion workers and the
//! webhook receiver.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use uqw_artifact::ArtifactWriter;
use uqw_client::{ScanService, UserWebhook};
use uqw_core::{AppConfig, ConfigError};
use uqw_ingest::{IngestError, IngestWorker};
use uqw_webhook::WebhookReceiver;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start ingest worker for {path}: {source}")]
    Worker {
        path: PathBuf,
        #[source]
        source: IngestError,
    },

    #[error("working directory unavailable: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Owns the validated config and the shared client and writer.
pub struct Orchestrator {
    config: AppConfig,
    service: Arc<dyn ScanService>,
    writer: Arc<ArtifactWriter>,
}

impl Orchestrator {
    /// Validate `config` and resolve relative output paths against the
    /// current working directory. Nothing is started yet.
    pub fn new(config: AppConfig, service: Arc<dyn ScanService>) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let writer = ArtifactWriter::new(Arc::clone(&service)).map_err(OrchestratorError::WorkingDir)?;
        Ok(Self {
            config,
            service,
            writer: Arc::new(writer),
        })
    }

    /// Like [`Orchestrator::new`] with an explicit writer.
    pub fn with_writer(
        config: AppConfig,
        service: Arc<dyn ScanService>,
        writer: Arc<ArtifactWriter>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        Ok(Self {
            config,
            service,
            writer,
        })
    }

    /// Look up the webhook registered on the account and log it so the
    /// operator can check it points at this listener.
    ///
    /// Returns the account's webhook settings, or `None` when webhooks are
    /// disabled locally or the lookup failed (logged, never fatal).
    pub async fn log_webhook_hint(&self) -> Option<UserWebhook> {
        if !self.config.webhooks.enabled {
            return None;
        }
        match self.service.user().await {
            Ok(user) => {
                let hook = user.notify.webhook;
                info!(url = %hook.url, listen = %self.config.webhooks.listen, "account webhook target");
                if !hook.enabled {
                    warn!("webhook delivery is disabled on the account, no events will arrive");
                }
                Some(hook)
            }
            Err(e) => {
                warn!(error = %e, "could not look up account webhook settings");
                None
            }
        }
    }

    /// Bind the webhook listener (if enabled), then start one worker per
    /// enabled submission source.
    pub async fn start(self) -> Result<Running, OrchestratorError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let webhook = if self.config.webhooks.enabled {
            let listen = self.config.webhooks.listen.clone();
            let listener = uqw_webhook::bind(&listen)
                .await
                .map_err(|source| OrchestratorError::Bind {
                    addr: listen.clone(),
                    source,
                })?;
            let addr = listener
                .local_addr()
                .map_err(|source| OrchestratorError::Bind { addr: listen, source })?;
            let receiver = Arc::new(WebhookReceiver::new(
                Arc::clone(&self.writer),
                &self.config.webhooks,
            ));
            let task = uqw_webhook::serve(listener, receiver, shutdown_rx.clone());
            Some((addr, task))
        } else {
            info!("webhook receiver disabled");
            None
        };

        let mut workers = Vec::new();
        for source in self.config.enabled_sources() {
            let path = source.file.clone();
            let worker = IngestWorker::new(
                source.clone(),
                Arc::clone(&self.service),
                Arc::clone(&self.writer),
                self.config.poll.clone(),
                self.config.tail_interval(),
            );
            match worker.start(shutdown_rx.clone()).await {
                // Workers stop on their own once shutdown is signalled.
                Ok(_handle) => workers.push(path),
                Err(source) => {
                    let _ = shutdown_tx.send(true);
                    return Err(OrchestratorError::Worker { path, source });
                }
            }
        }

        let skipped = self.config.submit.len() - workers.len();
        if skipped > 0 {
            info!(skipped, "submission sources disabled");
        }
        info!(
            workers = workers.len(),
            output_base = %self.writer.base_dir().display(),
            "orchestrator started"
        );

        Ok(Running {
            shutdown_tx,
            webhook,
            workers,
            shutdown_timeout: self.config.shutdown_timeout(),
        })
    }

    /// Start everything, wait for `quit`, then shut down.
    pub async fn run_until<F>(self, quit: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        quit.await;
        running.shutdown().await
    }
}

/// Handles to everything [`Orchestrator::start`] launched.
pub struct Running {
    shutdown_tx: watch::Sender<bool>,
    webhook: Option<(SocketAddr, JoinHandle<()>)>,
    /// Watched file of every started worker.
    workers: Vec<PathBuf>,
    shutdown_timeout: Duration,
}

impl Running {
    pub fn webhook_addr(&self) -> Option<SocketAddr> {
        self.webhook.as_ref().map(|(addr, _)| *addr)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signal every component to stop and drain the webhook listener within
    /// the configured timeout.
    ///
    /// Ingestion workers and in-flight pollers are not waited for.
    pub async fn shutdown(self) -> Result<(), OrchestratorError> {
        info!(timeout = ?self.shutdown_timeout, workers = ?self.workers, "shutting down");
        let _ = self.shutdown_tx.send(true);

        let result = match self.webhook {
            Some((_, task)) => drain(task, self.shutdown_timeout).await,
            None => Ok(()),
        };

        match &result {
            Ok(()) => info!("shutdown complete"),
            Err(e) => error!(error = %e, "shutdown timed out"),
        }
        result
    }
}

/// Wait up to `timeout` for a server task to finish, aborting it otherwise.
///
/// A server task that panicked still counts as drained.
pub async fn drain(mut task: JoinHandle<()>, timeout: Duration) -> Result<(), OrchestratorError> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(error = %e, "webhook server task panicked");
            Ok(())
        }
        Err(_) => {
            task.abort();
            Err(OrchestratorError::ShutdownTimeout(timeout))
        }
    }
}

/// Process exit status for a run: 0 on clean shutdown, 1 otherwise.
pub fn exit_status<E>(result: &Result<(), E>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_returns_once_task_finishes() {
        let task = tokio::spawn(async {});
        assert!(drain(task, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn drain_tolerates_panicked_server() {
        let task = tokio::spawn(async { panic!("listener blew up") });
        assert!(drain(task, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_task() {
        let task = tokio::spawn(std::future::pending::<()>());
        let result = drain(task, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(OrchestratorError::ShutdownTimeout(d)) if d == Duration::from_secs(60)));
        assert_eq!(exit_status(&result), 1);
    }

    #[test]
    fn exit_status_maps_results() {
        assert_eq!(exit_status::<OrchestratorError>(&Ok(())), 0);
        assert_eq!(
            exit_status(&Err(OrchestratorError::ShutdownTimeout(Duration::from_secs(1)))),
            1
        );
    }
}
