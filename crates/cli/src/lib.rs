//! Process orchestration for the `uqw` binary.
//!
//! This crate provides:
//! - `CliArgs`, the command line
//! - `Orchestrator`, which starts ingestion workers and the webhook receiver
//!   and performs bounded graceful shutdown
//! - `signals`, interrupt handling with forced exit on repeated signals

pub mod cli;
pub mod orchestrator;
pub mod signals;

pub use cli::CliArgs;
pub use orchestrator::{drain, exit_status, Orchestrator, OrchestratorError, Running};
