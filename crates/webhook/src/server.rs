//! HTTP surface of the webhook receiver.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::get;
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use uqw_core::WebhookEvent;

use crate::receiver::WebhookReceiver;

/// Upper bound on handling a single inbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const TOKEN_HEADER: &str = "x-webhook-token";

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    report_id: Option<String>,
    event: Option<String>,
    token: Option<String>,
}

/// Build the webhook router.
pub fn router(receiver: Arc<WebhookReceiver>) -> Router {
    Router::new()
        .route("/report/", get(report_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(receiver)
}

/// Bind the listen address. Failure here is fatal for the caller.
pub async fn bind(listen: &str) -> std::io::Result<TcpListener> {
    TcpListener::bind(listen).await
}

/// Serve on `listener` until `shutdown` flips to `true`, then drain.
///
/// Connections must deliver their request head within [`REQUEST_TIMEOUT`]
/// and handlers must answer within it. The returned handle resolves once every
/// connection has closed.
pub fn serve(
    listener: TcpListener,
    receiver: Arc<WebhookReceiver>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let app = router(receiver);
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "webhook server listening");
        }

        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(REQUEST_TIMEOUT);
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "webhook accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let service = TowerToHyperService::new(app.clone());
                    let conn = graceful.watch(http.serve_connection(TokioIo::new(stream), service));
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(peer = %peer, error = %e, "webhook connection closed with error");
                        }
                    });
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        drop(listener);
        info!("webhook server draining connections");
        graceful.shutdown().await;
        info!("webhook server stopped");
    })
}

/// Resolves once `true` is published or the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// `GET /report/`: acknowledge, then dispatch.
///
/// Malformed query strings are treated like unknown events: nothing is
/// dispatched and the request is still acknowledged.
async fn report_handler(
    State(receiver): State<Arc<WebhookReceiver>>,
    headers: HeaderMap,
    uri: Uri,
) -> StatusCode {
    info!(uri = %redact_token(&uri), "webhook request");

    let query = Query::<ReportQuery>::try_from_uri(&uri)
        .map(|Query(q)| q)
        .unwrap_or_default();

    if receiver.requires_token() {
        let token = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .or(query.token.as_deref());
        if !receiver.authorize(token) {
            warn!(uri = %uri.path(), "webhook request rejected: bad or missing token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    match WebhookEvent::from_query(query.report_id.as_deref(), query.event.as_deref()) {
        Some(event) => {
            // Fire and forget; the write outcome is logged by the writer.
            drop(receiver.dispatch(&event));
        }
        None => {
            info!(event = ?query.event, report_id = ?query.report_id, "no dispatch for webhook request");
        }
    }

    StatusCode::OK
}

/// Render a request URI for logging with any `token` value masked.
fn redact_token(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.to_string();
    };
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| {
            if pair.starts_with("token=") {
                "token=***".to_string()
            } else {
                pair.to_string()
            }
        })
        .collect();
    format!("{}?{}", uri.path(), masked.join("&"))
}
