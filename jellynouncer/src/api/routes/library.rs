//! Statistics, manual sync and webhook test routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::database::StoreStats;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/sync", post(trigger_sync))
        .route("/test-webhook", post(test_webhooks))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub database: StoreStats,
    pub pending_deletions: usize,
    pub queued_notifications: usize,
    pub sync_running: bool,
    pub uptime_secs: u64,
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let database = state.store.get_stats().await?;
    Ok(Json(StatsResponse {
        database,
        pending_deletions: state.processor.correlator().pending_count(),
        queued_notifications: state.processor.queue().pending_total(),
        sync_running: state.library_sync.is_running(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

/// Start a library synchronization in the background.
async fn trigger_sync(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if state.library_sync.is_running() {
        return Err(ApiError::conflict("Library sync already running"));
    }

    let sync = state.library_sync.clone();
    state.tasks.spawn(async move {
        match sync.run().await {
            Ok(report) => info!(
                "Manual sync finished: {} scanned, {} inserted, {} failed",
                report.scanned, report.inserted, report.failed
            ),
            Err(e) => error!("Manual sync failed: {}", e),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "sync_started" })),
    ))
}

#[derive(Debug, Serialize)]
pub struct WebhookTestResult {
    pub destination: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Post a test message to every configured webhook.
async fn test_webhooks(State(state): State<AppState>) -> ApiResult<Json<Vec<WebhookTestResult>>> {
    let discord = state
        .discord
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Discord transport not configured"))?;

    let mut results = Vec::new();
    for destination in discord.destinations() {
        let outcome = discord.send_test(&destination).await;
        results.push(WebhookTestResult {
            delivered: outcome.is_delivered(),
            error: (!outcome.is_delivered()).then(|| format!("{:?}", outcome)),
            destination,
        });
    }
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::create_router;
    use crate::api::routes::test_state::test_app;
    use crate::database::ItemStore;
    use crate::domain::{ContentKind, ItemSnapshot};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_stats() {
        let app = test_app();
        app.store
            .upsert(&ItemSnapshot::new("1", "Heat", ContentKind::Movie, "/m/1.mkv"))
            .await
            .unwrap();
        app.state
            .processor
            .correlator()
            .add_deletion("gone", serde_json::json!({}));

        let response = create_router(app.state.clone())
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["database"]["total_items"], 1);
        assert_eq!(json["database"]["items_by_kind"]["Movie"], 1);
        assert_eq!(json["pending_deletions"], 1);
        assert_eq!(json["sync_running"], false);
    }

    #[tokio::test]
    async fn test_sync_runs_in_background() {
        let app = test_app();
        app.fetcher
            .insert(ItemSnapshot::new("1", "Heat", ContentKind::Movie, "/m/1.mkv"));

        let response = create_router(app.state.clone())
            .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        app.state.tasks.close();
        app.state.tasks.wait().await;
        assert!(app.store.contains("1").await.unwrap());
        assert!(app.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_test_requires_transport() {
        let app = test_app();
        let response = create_router(app.state.clone())
            .oneshot(Request::post("/test-webhook").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
