//! Artifact writer.
//!
//! Given a job id and an [`OutputPolicy`], fetches each enabled artifact kind
//! from the [`ScanService`] and writes it under the policy's resolved output
//! directory. Kinds are handled independently: one failing fetch or write does
//! not stop the others, and a partial result is left on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use uqw_client::{ClientError, ScanService};
use uqw_core::{ArtifactKind, OutputPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ClientError),

    #[error("write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one [`ArtifactWriter::write`] call, one entry per attempted kind.
#[derive(Debug, Default)]
pub struct WriteSummary {
    pub job_id: String,
    pub results: Vec<(ArtifactKind, Result<PathBuf, ArtifactError>)>,
}

impl WriteSummary {
    pub fn written(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn attempted(&self) -> Vec<ArtifactKind> {
        self.results.iter().map(|(k, _)| *k).collect()
    }
}

/// Persists artifacts for finished jobs.
///
/// Relative policy paths resolve against the working directory captured when
/// the writer is built.
pub struct ArtifactWriter {
    service: Arc<dyn ScanService>,
    base_dir: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer resolving relative paths against the process cwd.
    pub fn new(service: Arc<dyn ScanService>) -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::with_base_dir(service, cwd))
    }

    pub fn with_base_dir(service: Arc<dyn ScanService>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Fetch and write every artifact kind `policy` asks for.
    ///
    /// Does not look at `policy.enabled`; callers decide whether a policy applies.
    pub async fn write(&self, job_id: &str, policy: &OutputPolicy) -> WriteSummary {
        let dir = policy.output_dir(&self.base_dir);
        let mut summary = WriteSummary {
            job_id: job_id.to_string(),
            results: Vec::new(),
        };

        let kinds: Vec<ArtifactKind> = policy.kinds().collect();
        if kinds.is_empty() {
            return summary;
        }

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to create output directory");
        }

        for kind in kinds {
            let result = self.write_one(job_id, kind, &dir).await;
            match &result {
                Ok(path) => {
                    info!(job_id, kind = %kind, path = %path.display(), "artifact written");
                }
                Err(e) => {
                    warn!(job_id, kind = %kind, error = %e, "artifact not written");
                }
            }
            summary.results.push((kind, result));
        }

        summary
    }

    /// Run [`ArtifactWriter::write`] on a detached task.
    pub fn spawn(self: &Arc<Self>, job_id: String, policy: OutputPolicy) -> JoinHandle<WriteSummary> {
        let writer = Arc::clone(self);
        tokio::spawn(async move { writer.write(&job_id, &policy).await })
    }

    async fn write_one(
        &self,
        job_id: &str,
        kind: ArtifactKind,
        dir: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        info!(job_id, kind = %kind, "fetching artifact");
        let data = self.service.artifact(kind, job_id).await?;

        let path = dir.join(kind.file_name(job_id));
        tokio::fs::write(&path, &data)
            .await
            .map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
