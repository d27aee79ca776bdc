use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use envelope_token::TokenManager;
use secrecy::SecretString;
use session_store::{KubeSessionStore, SessionStore};
use tracing::{info, warn};

use crate::{
    api::{self, AppState},
    cluster,
    config::{BrokerConfig, TlsSettings, decode_key},
    oidc::Provider,
};

#[derive(Debug)]
pub struct Args {
    pub listen_addr: SocketAddr,
    pub base_url: String,
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub cluster_name: String,
    pub cluster_server: Option<String>,
    pub cluster_ca_data: Option<String>,
    pub cluster_ca_file: Option<String>,
    pub namespace: String,
    pub signing_key: Option<String>,
    pub content_key: Option<String>,
    pub tls: Option<TlsSettings>,
    pub session_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub allowed_origins: Vec<String>,
    pub allowed_groups: Vec<String>,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub rotation_window: u32,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if key material is unusable, the cluster identity cannot
/// be resolved, provider discovery fails, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let (signing_key, content_key) =
        resolve_keys(args.signing_key.as_deref(), args.content_key.as_deref())?;
    let tokens = TokenManager::new(signing_key, content_key)
        .map_err(|err| anyhow!("invalid key material: {err}"))?;

    let cluster_server = cluster::resolve_cluster_server(args.cluster_server.as_deref())?;
    let cluster_ca =
        cluster::resolve_cluster_ca(args.cluster_ca_data.as_deref(), args.cluster_ca_file.as_deref())?;

    let config = BrokerConfig {
        issuer_url: args.issuer_url,
        client_id: args.client_id,
        cluster_name: args.cluster_name,
        cluster_server,
        cluster_ca,
        namespace: args.namespace,
        base_url: args.base_url,
        listen_addr: args.listen_addr,
        tls: args.tls,
        session_ttl: args.session_ttl,
        refresh_token_ttl: args.refresh_token_ttl,
        allowed_origins: args.allowed_origins,
        allowed_groups: args.allowed_groups,
        rate_limit_rps: args.rate_limit_rps,
        rate_limit_burst: args.rate_limit_burst,
        rotation_window: args.rotation_window,
    };
    log_startup(&config);

    let provider = Provider::discover(
        &config.issuer_url,
        &config.client_id,
        args.client_secret,
        &config.redirect_url(),
    )
    .await
    .context("failed to discover OIDC provider")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let store: Arc<dyn SessionStore> = Arc::new(KubeSessionStore::new(client, &config.namespace));

    let state = AppState::new(config, tokens, provider, store);
    api::serve(state).await
}

// A broker started without configured keys generates a random pair. Those
// envelopes die with the process and cannot be validated by other replicas,
// so the generated values are logged for promotion into real configuration.
fn resolve_keys(signing: Option<&str>, content: Option<&str>) -> Result<(Vec<u8>, Vec<u8>)> {
    let signing = signing.filter(|value| !value.is_empty());
    let content = content.filter(|value| !value.is_empty());

    if let (Some(signing), Some(content)) = (signing, content) {
        return Ok((decode_key(signing), decode_key(content)));
    }

    warn!(
        "envelope keys not configured; generating a random pair (set KAUTH_SIGNING_KEY and KAUTH_CONTENT_KEY in production)"
    );
    let signing_key = envelope_token::generate_key(32).map_err(|err| anyhow!("{err}"))?;
    let content_key = envelope_token::generate_key(32).map_err(|err| anyhow!("{err}"))?;
    info!("generated KAUTH_SIGNING_KEY: {}", STANDARD.encode(&signing_key));
    info!("generated KAUTH_CONTENT_KEY: {}", STANDARD.encode(&content_key));

    Ok((signing_key, content_key))
}

fn log_startup(config: &BrokerConfig) {
    let entries = [
        ("listen", config.listen_addr.to_string()),
        ("base_url", config.base_url.clone()),
        ("issuer_url", config.issuer_url.clone()),
        ("client_id", config.client_id.clone()),
        ("cluster", config.cluster_name.clone()),
        ("cluster_server", config.cluster_server.clone()),
        ("namespace", config.namespace.clone()),
        (
            "session_ttl",
            format!("{}s", config.session_ttl.num_seconds()),
        ),
        (
            "refresh_token_ttl",
            format!("{}s", config.refresh_token_ttl.num_seconds()),
        ),
        (
            "rate_limit",
            format!(
                "{} rps, burst {}",
                config.rate_limit_rps, config.rate_limit_burst
            ),
        ),
        (
            "cors_origins",
            if config.allowed_origins.is_empty() {
                "disabled".to_string()
            } else {
                config.allowed_origins.join(",")
            },
        ),
        (
            "allowed_groups",
            if config.allowed_groups.is_empty() {
                "any authenticated".to_string()
            } else {
                config.allowed_groups.join(",")
            },
        ),
        (
            "tls",
            config.tls.as_ref().map_or_else(
                || "disabled".to_string(),
                |settings| settings.cert.display().to_string(),
            ),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = String::from("Startup configuration:");
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ = write!(message, "\n  {key}:{padding} {value}");
    }
    info!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_keys_are_decoded() {
        let (signing, content) = resolve_keys(Some("a2V5"), Some("!raw-bytes!")).expect("keys");
        assert_eq!(signing, b"key".to_vec());
        assert_eq!(content, b"!raw-bytes!".to_vec());
    }

    #[test]
    fn missing_keys_generate_a_random_pair() {
        let (signing, content) = resolve_keys(None, None).expect("keys");
        assert_eq!(signing.len(), 32);
        assert_eq!(content.len(), 32);
        assert_ne!(signing, content);
    }

    #[test]
    fn partial_key_config_regenerates_both() {
        let (signing, content) = resolve_keys(Some("a2V5"), None).expect("keys");
        assert_ne!(signing, b"key".to_vec());
        assert_eq!(signing.len(), 32);
        assert_eq!(content.len(), 32);
    }

    #[test]
    fn empty_strings_count_as_unset() {
        let (signing, content) = resolve_keys(Some(""), Some("")).expect("keys");
        assert_eq!(signing.len(), 32);
        assert_eq!(content.len(), 32);
    }
}
