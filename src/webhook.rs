//! HTTP boundary: Telegram webhook and liveness routes.
//!
//! Updates are decoded and handed to the bot through a channel; the reply is
//! always `200 OK` so Telegram never retries an update because of an
//! application error. Only `/webhook/{token}` is registered with Telegram,
//! so only that path is trusted; a POST to the bare path is acknowledged and
//! dropped.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use axum::Router;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::channels::{InboundEvent, parse_update};

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub events: UnboundedSender<InboundEvent>,
    /// Expected token segment of `/webhook/{token}`.
    pub token: SecretString,
}

/// GET / and GET /webhook/{token}
async fn health() -> &'static str {
    "OK"
}

/// GET /webhook
async fn webhook_info() -> &'static str {
    "Webhook here"
}

/// POST /webhook
async fn receive_untrusted() -> StatusCode {
    tracing::warn!("Webhook call without a token ignored");
    StatusCode::OK
}

/// POST /webhook/{token}
async fn receive_with_token(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if token != state.token.expose_secret() {
        tracing::warn!("Webhook call with unknown token ignored");
        return StatusCode::OK;
    }
    enqueue(&state, &headers, &body);
    StatusCode::OK
}

fn enqueue(state: &WebhookState, headers: &HeaderMap, body: &[u8]) {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        tracing::warn!("Webhook call without a JSON content type ignored");
        return;
    }

    let update: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Webhook body is not valid JSON: {e}");
            return;
        }
    };
    let Some(event) = parse_update(&update) else {
        tracing::debug!("Webhook update carries no message");
        return;
    };
    if state.events.send(event).is_err() {
        tracing::warn!("Bot dispatcher is gone; dropping update");
    }
}

/// Build the webhook and liveness routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", get(webhook_info).post(receive_untrusted))
        .route("/webhook/{token}", get(health).post(receive_with_token))
        .with_state(state)
}

/// Liveness routes only, for polling mode.
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", get(webhook_info))
}
