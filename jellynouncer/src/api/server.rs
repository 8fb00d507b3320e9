//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::database::ItemStore;
use crate::error::{Error, Result};
use crate::ingest::{EventProcessor, LibrarySync};
use crate::jellyfin::JellyfinClient;
use crate::logging::LoggingConfig;
use crate::notification::DiscordTransport;

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 1984,
            body_limit: 1024 * 1024,
        }
    }
}

impl ApiServerConfig {
    /// Apply `API_BIND_ADDRESS` and `API_PORT` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_address) = lookup("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            self.bind_address = bind_address;
        }

        if let Some(port) = lookup("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            self.port = parsed;
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {}", e)))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub processor: Arc<EventProcessor>,
    pub store: Arc<dyn ItemStore>,
    pub library_sync: Arc<LibrarySync>,
    /// Used by the health check; absent in tests.
    pub jellyfin: Option<Arc<JellyfinClient>>,
    pub discord: Option<Arc<DiscordTransport>>,
    pub logging_config: Option<Arc<LoggingConfig>>,
    /// Background work spawned by handlers, drained on shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(
        processor: Arc<EventProcessor>,
        store: Arc<dyn ItemStore>,
        library_sync: Arc<LibrarySync>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            processor,
            store,
            library_sync,
            jellyfin: None,
            discord: None,
            logging_config: None,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_jellyfin(mut self, client: Arc<JellyfinClient>) -> Self {
        self.jellyfin = Some(client);
        self
    }

    pub fn with_discord(mut self, transport: Arc<DiscordTransport>) -> Self {
        self.discord = Some(transport);
        self
    }

    pub fn with_logging_config(mut self, config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(config);
        self
    }
}

fn is_quiet_path(req: &Request) -> bool {
    req.uri().path().starts_with("/health")
}

/// Build the router with all middleware and routes.
pub fn build_router(state: AppState, config: &ApiServerConfig) -> Router {
    routes::create_router(state)
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if is_quiet_path(req) {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_request(|req: &Request, span: &Span| {
                    if span.is_disabled() || is_quiet_path(req) {
                        return;
                    }
                    let mut on_request =
                        tower_http::trace::DefaultOnRequest::new().level(tracing::Level::INFO);
                    use tower_http::trace::OnRequest;
                    on_request.on_request(req, span);
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
}

/// Webhook receiver and status API.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let router = build_router(self.state.clone(), &self.config);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await?;

        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 1984);
        assert_eq!(config.socket_addr().unwrap().port(), 1984);
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([("API_BIND_ADDRESS", "127.0.0.1"), ("API_PORT", "not-a-port")]);
        let mut config = ApiServerConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 1984);
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = ApiServerConfig {
            bind_address: "nowhere".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.socket_addr(), Err(Error::Configuration(_))));
    }
}
