//! URL helpers.

use url::Url;

/// Mask secrets in a URL before it is logged.
///
/// Discord webhook URLs carry their token as the last path segment and
/// Jellyfin accepts `api_key` as a query parameter; both are replaced with
/// `***`. Unparsable input is masked entirely.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "***".to_string();
    };

    let _ = url.set_password(None);

    if let Some(segments) = url.path_segments() {
        let segments: Vec<&str> = segments.collect();
        if let Some(pos) = segments.iter().position(|s| *s == "webhooks")
            && segments.len() > pos + 2
        {
            let mut masked: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            for segment in masked.iter_mut().skip(pos + 2) {
                *segment = "***".to_string();
            }
            url.set_path(&format!("/{}", masked.join("/")));
        }
    }

    if url.query().is_some() {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let lowered = k.to_ascii_lowercase();
                if lowered.contains("key") || lowered.contains("token") {
                    (k.into_owned(), "***".to_string())
                } else {
                    (k.into_owned(), v.into_owned())
                }
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_discord_token() {
        assert_eq!(
            redact_url("https://discord.com/api/webhooks/123/abcdef"),
            "https://discord.com/api/webhooks/123/***"
        );
    }

    #[test]
    fn masks_api_key_query() {
        assert_eq!(
            redact_url("http://jellyfin:8096/Items?api_key=secret&Fields=Path"),
            "http://jellyfin:8096/Items?api_key=***&Fields=Path"
        );
    }

    #[test]
    fn leaves_plain_urls() {
        assert_eq!(redact_url("http://jellyfin:8096/"), "http://jellyfin:8096/");
    }

    #[test]
    fn masks_garbage() {
        assert_eq!(redact_url("not a url"), "***");
    }
}
