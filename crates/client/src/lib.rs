//! Client for the remote URL-analysis service.
//!
//! This crate provides:
//! - `ScanService` trait covering submit, queue status, artifact fetch and user lookup
//! - `HttpScanService`, the reqwest-backed implementation
//! - `ScriptedService`, an in-memory double (feature `testing`)

pub mod error;
pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod service;

pub use error::ClientError;
pub use http::HttpScanService;
#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedService;
pub use service::{ScanService, SubmitRequest, Submission, UserInfo, UserWebhook};
