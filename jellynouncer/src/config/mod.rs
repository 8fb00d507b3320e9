//! Application configuration.
//!
//! Loaded from a JSON file (`config/config.json`, or the path in
//! `JELLYNOUNCER_CONFIG`) with environment variable overrides on top. A
//! `.env` file is read first when present. Every section has defaults, so a
//! deployment configured purely through the environment needs no file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::api::server::ApiServerConfig;
use crate::database::MaintenanceConfig;
use crate::domain::ChangeKind;
use crate::ingest::ProcessorConfig;
use crate::jellyfin::JellyfinSettings;
use crate::notification::routing::DEFAULT_DESTINATION;
use crate::notification::{DeliveryMode, QueueConfig, RateLimitConfig, Router};
use crate::{Error, Result};

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "JELLYNOUNCER_CONFIG";

/// Config file used when `JELLYNOUNCER_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub jellyfin: JellyfinConfig,
    pub discord: DiscordConfig,
    pub notifications: NotificationConfig,
    pub rate_limit: RateLimitSettings,
    pub server: ApiServerConfig,
    pub database: DatabaseConfig,
    pub logging: LogConfig,
    pub maintenance: MaintenanceSettings,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JellyfinConfig {
    pub server_url: String,
    pub api_key: String,
    pub user_id: String,
    pub timeout_seconds: u64,
}

impl Default for JellyfinConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_key: String::new(),
            user_id: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl JellyfinConfig {
    /// Server URL with a scheme and without a trailing slash.
    pub fn normalized_url(&self) -> String {
        let url = self.server_url.trim();
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };
        url.trim_end_matches('/').to_string()
    }

    pub fn settings(&self) -> JellyfinSettings {
        JellyfinSettings {
            server_url: self.normalized_url(),
            api_key: self.api_key.clone(),
            user_id: self.user_id.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

/// How a destination groups its notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    #[default]
    None,
    Event,
    Type,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub mode: GroupingMode,
    pub delay_minutes: u64,
    pub max_items: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            mode: GroupingMode::None,
            delay_minutes: 5,
            max_items: 20,
        }
    }
}

impl GroupingConfig {
    pub fn delivery_mode(&self) -> DeliveryMode {
        match self.mode {
            GroupingMode::None => DeliveryMode::Immediate,
            _ => DeliveryMode::Batched {
                delay: Duration::from_secs(self.delay_minutes * 60),
                max_items: self.max_items.max(1),
            },
        }
    }
}

/// One Discord webhook. Accepts either a bare URL string or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawWebhook")]
pub struct WebhookConfig {
    pub url: String,
    pub enabled: bool,
    pub grouping: GroupingConfig,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            grouping: GroupingConfig::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWebhook {
    Url(String),
    Full {
        url: String,
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default)]
        grouping: GroupingConfig,
    },
}

impl From<RawWebhook> for WebhookConfig {
    fn from(raw: RawWebhook) -> Self {
        match raw {
            RawWebhook::Url(url) => Self::new(url),
            RawWebhook::Full {
                url,
                enabled,
                grouping,
            } => Self {
                url,
                enabled,
                grouping,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhooks: BTreeMap<String, WebhookConfig>,
    pub routing: RoutingConfig,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

impl DiscordConfig {
    fn enabled_webhooks(&self) -> impl Iterator<Item = (&String, &WebhookConfig)> {
        self.webhooks
            .iter()
            .filter(|(_, w)| w.enabled && !w.url.trim().is_empty())
    }

    /// Destination key to webhook URL for every enabled webhook.
    pub fn webhook_urls(&self) -> HashMap<String, String> {
        self.enabled_webhooks()
            .map(|(key, w)| (key.clone(), w.url.clone()))
            .collect()
    }

    pub fn router(&self) -> Router {
        Router::new(self.enabled_webhooks().map(|(key, _)| key.clone()), self.routing.enabled)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            modes: self
                .enabled_webhooks()
                .map(|(key, w)| (key.clone(), w.grouping.delivery_mode()))
                .collect(),
            ..QueueConfig::default()
        }
    }

    fn set_webhook_url(&mut self, key: &str, url: String) {
        self.webhooks
            .entry(key.to_string())
            .and_modify(|w| w.url = url.clone())
            .or_insert_with(|| WebhookConfig::new(url));
    }
}

/// Per-dimension switches; keys follow the config file names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchChanges {
    pub resolution: bool,
    pub codec: bool,
    pub audio_codec: bool,
    pub hdr_status: bool,
    pub audio_channels: bool,
    pub quality: bool,
}

impl Default for WatchChanges {
    fn default() -> Self {
        Self {
            resolution: true,
            codec: true,
            audio_codec: true,
            hdr_status: true,
            audio_channels: true,
            quality: true,
        }
    }
}

impl WatchChanges {
    pub fn watched(&self) -> BTreeSet<ChangeKind> {
        [
            (self.resolution, ChangeKind::Resolution),
            (self.codec, ChangeKind::VideoCodec),
            (self.audio_codec, ChangeKind::AudioCodec),
            (self.hdr_status, ChangeKind::Hdr),
            (self.audio_channels, ChangeKind::AudioChannels),
            (self.quality, ChangeKind::FileSize),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub watch_changes: WatchChanges,
    pub filter_renames: bool,
    pub filter_deletes: bool,
    pub deletion_delay_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            watch_changes: WatchChanges::default(),
            filter_renames: true,
            filter_deletes: true,
            deletion_delay_seconds: 30,
        }
    }
}

impl NotificationConfig {
    pub fn deletion_delay(&self) -> Duration {
        Duration::from_secs(self.deletion_delay_seconds)
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            filter_renames: self.filter_renames,
            filter_deletes: self.filter_deletes,
            watched: self.watch_changes.watched(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            max_requests: defaults.max_requests,
            window_seconds: defaults.window.as_secs(),
        }
    }
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/jellynouncer.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub interval_hours: u64,
    pub notification_retention_days: i64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        let defaults = MaintenanceConfig::default();
        Self {
            interval_hours: defaults.interval.as_secs() / 3600,
            notification_retention_days: defaults.notification_retention_days,
        }
    }
}

impl MaintenanceSettings {
    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            interval: Duration::from_secs(self.interval_hours.max(1) * 3600),
            notification_retention_days: self.notification_retention_days,
        }
    }
}

/// Periodic library synchronization. Disabled when `interval_hours` is 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub on_startup: bool,
    pub interval_hours: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            on_startup: true,
            interval_hours: 24,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_hours > 0).then(|| Duration::from_secs(self.interval_hours * 3600))
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load `.env`, the config file and environment overrides, then validate.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }

        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::from_file_or_default(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse the JSON file at `path`; a missing file yields the defaults.
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let config = serde_json::from_str(&raw).map_err(|e| {
                    Error::config(format!("Invalid config file {}: {}", path.display(), e))
                })?;
                info!(path = %path.display(), "Loaded configuration file");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "No config file found, using defaults and environment"
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JELLYFIN_SERVER_URL") {
            self.jellyfin.server_url = v;
        }
        if let Some(v) = get("JELLYFIN_API_KEY") {
            self.jellyfin.api_key = v;
        }
        if let Some(v) = get("JELLYFIN_USER_ID") {
            self.jellyfin.user_id = v;
        }

        for (var, key) in [
            ("DISCORD_WEBHOOK_URL", DEFAULT_DESTINATION),
            ("DISCORD_WEBHOOK_URL_MOVIES", "movies"),
            ("DISCORD_WEBHOOK_URL_TV", "tv"),
            ("DISCORD_WEBHOOK_URL_MUSIC", "music"),
        ] {
            if let Some(url) = get(var) {
                self.discord.set_webhook_url(key, url);
            }
        }

        if let Some(v) = get("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = get("LOG_DIR") {
            self.logging.dir = v;
        }
        self.server.apply_env_overrides(&get);
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("jellyfin.server_url", &self.jellyfin.server_url),
            ("jellyfin.api_key", &self.jellyfin.api_key),
            ("jellyfin.user_id", &self.jellyfin.user_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!(
                    "Required configuration missing: {}",
                    name
                )));
            }
        }
        Url::parse(&self.jellyfin.normalized_url())
            .map_err(|e| Error::config(format!("Invalid jellyfin.server_url: {}", e)))?;

        if self.discord.enabled_webhooks().next().is_none() {
            return Err(Error::config(
                "At least one Discord webhook URL must be configured",
            ));
        }
        for (key, webhook) in self.discord.enabled_webhooks() {
            let url = Url::parse(&webhook.url).map_err(|e| {
                Error::config(format!("Invalid URL for webhook '{}': {}", key, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::config(format!(
                    "Webhook '{}' must use http or https",
                    key
                )));
            }
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window_seconds == 0 {
            return Err(Error::config(
                "rate_limit.max_requests and rate_limit.window_seconds must be positive",
            ));
        }
        Ok(())
    }
}
