//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::Utc;
use serde::Serialize;

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: &'static str,
    /// `connected`, `error`, or `unknown` when no client is attached.
    pub jellyfin: &'static str,
    pub total_items: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Store reachability decides the status code; an unreachable media server
/// only degrades the report.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut response = HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        database: "connected",
        jellyfin: "unknown",
        total_items: 0,
        error: None,
    };

    match state.store.get_stats().await {
        Ok(stats) => response.total_items = stats.total_items,
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            response.status = "unhealthy";
            response.database = "error";
            response.error = Some(e.to_string());
            return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
        }
    }

    if let Some(jellyfin) = &state.jellyfin {
        if jellyfin.test_connection().await {
            response.jellyfin = "connected";
        } else {
            response.jellyfin = "error";
            response.status = "degraded";
        }
    }

    (StatusCode::OK, Json(response))
}

async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": state.start_time.elapsed().as_secs()
        })),
    )
}

#[cfg(test)]
mod tests {
    use crate::api::routes::create_router;
    use crate::api::routes::test_state::test_app;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_health(router: axum::Router) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_store() {
        let app = test_app();
        let (status, body) = get_health(create_router(app.state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "connected");
        assert_eq!(body["jellyfin"], "unknown");
    }

    #[tokio::test]
    async fn test_health_unavailable_when_store_fails() {
        let app = test_app();
        app.store.fail_reads(true);
        let (status, body) = get_health(create_router(app.state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }
}
