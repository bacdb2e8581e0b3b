//! Shared model and configuration for the uqw URL submission watcher.
//!
//! This crate provides:
//! - `AppConfig` and friends, loaded from YAML and validated once at startup
//! - `OutputPolicy` / `ArtifactKind` describing which artifacts land where
//! - `Job`, `JobStatus`, `QueueStatus` and `WebhookEvent` for the job lifecycle

pub mod config;
pub mod error;
pub mod job;
pub mod policy;

pub use config::{AppConfig, PollSettings, SubmissionParams, SubmitterSettings, WebhookReports, WebhookSettings};
pub use error::ConfigError;
pub use job::{EventKind, Job, JobStatus, QueueStatus, WebhookEvent};
pub use policy::{resolve_output_dir, ArtifactKind, OutputPolicy};
