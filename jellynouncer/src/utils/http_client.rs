use std::{sync::OnceLock, time::Duration};

use tracing::debug;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the shared `reqwest::Client` used for outbound HTTP.
pub fn build_client(request_timeout: Duration) -> crate::Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("jellynouncer/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(4);

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder
        .build()
        .map_err(|e| crate::Error::config(format!("failed to build HTTP client: {}", e)))
}
