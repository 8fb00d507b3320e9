//! Jellyfin webhook receiver.

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::domain::payload_name;
use crate::jellyfin::webhook::{WebhookDisposition, classify, notification_type};

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_webhook))
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub event: String,
}

/// Accept a webhook and process it in the background.
///
/// Replies as soon as the body is parsed; the outcome only shows up in logs
/// and notifications.
async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Empty request body"));
    }
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        ApiError::bad_request("Invalid JSON")
            .with_details(serde_json::json!({ "reason": e.to_string() }))
    })?;
    if !payload.is_object() {
        return Err(ApiError::bad_request("Webhook body must be a JSON object"));
    }

    let event = notification_type(&payload).unwrap_or("Unknown").to_string();
    info!(
        "Received webhook: {} for '{}'",
        event,
        payload_name(&payload).unwrap_or("Unknown")
    );

    match classify(payload) {
        WebhookDisposition::Event(library_event) => {
            let processor = state.processor.clone();
            state.tasks.spawn(async move {
                processor.process(library_event).await;
            });
        }
        WebhookDisposition::MissingItemId => warn!("Webhook missing ItemId"),
        WebhookDisposition::Unsupported(kind) => {
            debug!("Ignoring webhook event type: {}", kind.as_deref().unwrap_or("none"))
        }
    }

    Ok(Json(WebhookAck {
        status: "received",
        event,
    }))
}
