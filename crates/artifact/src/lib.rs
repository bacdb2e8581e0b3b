//! Fetches finished-analysis artifacts and persists them to disk.

pub mod writer;

pub use writer::{ArtifactError, ArtifactWriter, WriteSummary};
