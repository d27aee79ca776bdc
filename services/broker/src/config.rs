use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Duration;

/// Runtime configuration shared by every handler.
///
/// Key material is intentionally not part of this struct; it goes straight
/// into the token manager at startup and never travels with request state.
#[derive(Clone)]
pub struct BrokerConfig {
    pub issuer_url: String,
    pub client_id: String,

    pub cluster_name: String,
    pub cluster_server: String,
    /// Base64-encoded PEM bundle of the cluster CA.
    pub cluster_ca: String,
    /// Namespace holding the session records.
    pub namespace: String,

    /// Externally reachable base URL, e.g. `https://kauth.example.com`.
    pub base_url: String,
    pub listen_addr: SocketAddr,
    pub tls: Option<TlsSettings>,

    pub session_ttl: Duration,
    pub refresh_token_ttl: Duration,

    pub allowed_origins: Vec<String>,
    pub allowed_groups: Vec<String>,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    /// Accepted lag of refresh envelope rotation counters. Carried for a
    /// future strict mode; not enforced during validation.
    pub rotation_window: u32,
}

#[derive(Clone, Debug)]
pub struct TlsSettings {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl BrokerConfig {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Redirect URL registered with the provider.
    #[must_use]
    pub fn redirect_url(&self) -> String {
        format!("{}/callback", self.base())
    }

    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/start-login", self.base())
    }

    #[must_use]
    pub fn refresh_url(&self) -> String {
        format!("{}/refresh", self.base())
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("cluster_name", &self.cluster_name)
            .field("cluster_server", &self.cluster_server)
            .field("cluster_ca", &"***")
            .field("namespace", &self.namespace)
            .field("base_url", &self.base_url)
            .field("listen_addr", &self.listen_addr)
            .field("tls", &self.tls)
            .field("session_ttl", &self.session_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("allowed_origins", &self.allowed_origins)
            .field("allowed_groups", &self.allowed_groups)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("rotation_window", &self.rotation_window)
            .finish()
    }
}

/// Decode configured key material: base64 when it parses, raw bytes
/// otherwise.
#[must_use]
pub fn decode_key(value: &str) -> Vec<u8> {
    match STANDARD.decode(value) {
        Ok(decoded) => decoded,
        Err(_) => value.as_bytes().to_vec(),
    }
}
