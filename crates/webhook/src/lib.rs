//! Inbound push notifications from the analysis service.
//!
//! Exposes `GET /report/?report_id=<id>&event=<completed|alerted>` and hands
//! each recognised event to the artifact writer with the output policy bound to
//! its kind. Requests are acknowledged with `200 OK` before any artifact is
//! fetched.

pub mod receiver;
pub mod server;

pub use receiver::WebhookReceiver;
pub use server::{bind, router, serve, REQUEST_TIMEOUT};
