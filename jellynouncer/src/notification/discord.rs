//! Discord webhook transport.
//!
//! Makes exactly one POST per call and reports 429 responses back to the
//! queue together with the retry hint Discord sent:
//! - `Retry-After` header
//! - `X-RateLimit-Reset-After` header
//! - `retry_after` field of the JSON body

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{DeliveryOutcome, DeliveryTransport};
use crate::utils::url::redact_url;

/// Used when a 429 response carries no usable hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Discord transport keyed by destination (route key).
pub struct DiscordTransport {
    client: Client,
    webhooks: HashMap<String, String>,
}

impl DiscordTransport {
    /// `webhooks` maps destination keys to webhook URLs.
    pub fn new(client: Client, webhooks: HashMap<String, String>) -> Self {
        Self { client, webhooks }
    }

    pub fn has_destination(&self, destination: &str) -> bool {
        self.webhooks.contains_key(destination)
    }

    /// Configured destination keys, sorted.
    pub fn destinations(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.webhooks.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Post a plain test message to one destination.
    pub async fn send_test(&self, destination: &str) -> DeliveryOutcome {
        let payload = serde_json::json!({
            "embeds": [{
                "title": "Jellynouncer Test",
                "description": format!("Webhook `{}` is configured correctly.", destination),
                "color": 0x5865F2,
            }]
        });
        self.deliver(destination, &payload).await
    }
}

#[async_trait]
impl DeliveryTransport for DiscordTransport {
    async fn deliver(&self, destination: &str, payload: &Value) -> DeliveryOutcome {
        let Some(url) = self.webhooks.get(destination) else {
            return DeliveryOutcome::Failed(format!("no webhook configured for '{}'", destination));
        };

        let response = match self.client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                // The URL carries the webhook token.
                let e = e.without_url();
                warn!(destination = %destination, "Discord request failed: {}", e);
                return DeliveryOutcome::Failed(format!("Discord request failed: {}", e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(destination = %destination, "Discord notification sent");
            return DeliveryOutcome::Delivered;
        }

        if status.as_u16() == 429 {
            let from_headers = retry_after_from_headers(response.headers());
            let retry_after = match from_headers {
                Some(d) => d,
                None => {
                    let body = response.text().await.unwrap_or_default();
                    retry_after_from_body(&body).unwrap_or(DEFAULT_RETRY_AFTER)
                }
            };
            debug!(
                destination = %destination,
                "Discord rate limited (429), retry after {:?}",
                retry_after
            );
            return DeliveryOutcome::RateLimited { retry_after };
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            destination = %destination,
            webhook = %redact_url(url),
            "Discord webhook failed: {} - {}",
            status,
            body
        );
        DeliveryOutcome::Failed(format!("Discord webhook failed: {} - {}", status, body))
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    let secs = raw.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Retry hint from the `Retry-After` or `X-RateLimit-Reset-After` header.
fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find_map(parse_seconds)
}

/// Retry hint from the `retry_after` field (seconds) of a 429 body.
fn retry_after_from_body(body: &str) -> Option<Duration> {
    let value: Value = serde_json::from_str(body).ok()?;
    let secs = value.get("retry_after")?.as_f64()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Reset-After", HeaderValue::from_static("3.5"));
        assert_eq!(
            retry_after_from_headers(&headers),
            Some(Duration::from_millis(3500))
        );

        headers.insert("Retry-After", HeaderValue::from_static("2"));
        assert_eq!(
            retry_after_from_headers(&headers),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_retry_after_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static("soon"));
        assert_eq!(retry_after_from_headers(&headers), None);
        assert_eq!(parse_seconds("-1"), None);
    }

    #[test]
    fn test_retry_after_from_body() {
        assert_eq!(
            retry_after_from_body(r#"{"message": "You are being rate limited.", "retry_after": 0.25, "global": false}"#),
            Some(Duration::from_millis(250))
        );
        assert_eq!(retry_after_from_body("not json"), None);
        assert_eq!(retry_after_from_body("{}"), None);
    }

    #[tokio::test]
    async fn test_unknown_destination_fails_without_request() {
        let client = crate::utils::http_client::build_client(Duration::from_secs(5)).unwrap();
        let transport = DiscordTransport::new(client, HashMap::new());
        let outcome = transport.deliver("movies", &serde_json::json!({})).await;
        assert!(matches!(outcome, DeliveryOutcome::Failed(reason) if reason.contains("movies")));
        assert!(!transport.has_destination("movies"));
        assert!(transport.destinations().is_empty());
    }
}
