//! File ingestion and completion polling.
//!
//! This crate provides:
//! - `FileTailer`, which follows a watched file across rotation and recreation
//! - `IngestWorker`, which submits each appended line and launches pollers
//! - `CompletionPoller`, which waits for a job to finish and writes its artifacts

pub mod error;
pub mod poller;
pub mod tail;
pub mod worker;

pub use error::IngestError;
pub use poller::{CompletionPoller, PollOutcome};
pub use tail::FileTailer;
pub use worker::IngestWorker;
