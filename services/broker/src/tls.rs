//! TLS assets for the broker's own listener. The broker serves plain HTTP
//! when no cert/key pair is configured; a terminating proxy is then expected
//! in front of it.

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsSettings;

/// Load the configured PEM cert/key pair into a rustls server config.
///
/// # Errors
/// Fails when either file is missing or unparseable.
pub async fn load_rustls_config(settings: &TlsSettings) -> Result<RustlsConfig> {
    RustlsConfig::from_pem_file(&settings.cert, &settings.key)
        .await
        .with_context(|| {
            format!(
                "failed to load TLS assets from {} / {}",
                settings.cert.display(),
                settings.key.display()
            )
        })
}
