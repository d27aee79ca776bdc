//! Shared fixtures: a broker wired to an in-memory session store and a
//! wiremock OIDC provider that signs real RS256 ID tokens.
#![allow(dead_code)]

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use envelope_token::TokenManager;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use kauth_broker::{
    api::AppState,
    config::BrokerConfig,
    oidc::{DiscoveryDocument, Provider},
};
use rsa::{
    RsaPrivateKey,
    pkcs8::{EncodePrivateKey, LineEnding},
    traits::PublicKeyParts,
};
use secrecy::SecretString;
use serde_json::json;
use session_store::MemoryStore;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

pub const CLIENT_ID: &str = "kauth";
pub const KID: &str = "test-key";

/// A mock identity provider: discovery document, JWKS, and a signing key
/// for minting ID tokens the broker will accept.
pub struct TestIdp {
    pub server: MockServer,
    pub issuer: String,
    encoding: EncodingKey,
}

impl TestIdp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();

        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("rsa key generation");
        let pem = key.to_pkcs8_pem(LineEnding::LF).expect("pkcs8 pem");
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key");

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}/jwks"),
            })))
            .mount(&server)
            .await;

        let n = URL_SAFE_NO_PAD.encode(key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(key.e().to_bytes_be());
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kty": "RSA",
                    "kid": KID,
                    "alg": "RS256",
                    "use": "sig",
                    "n": n,
                    "e": e,
                }]
            })))
            .mount(&server)
            .await;

        Self {
            server,
            issuer,
            encoding,
        }
    }

    /// Sign an ID token the broker's verifier accepts.
    pub fn id_token(&self, email: &str, groups: &[&str]) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "iss": self.issuer,
            "aud": CLIENT_ID,
            "sub": "sub-1",
            "email": email,
            "groups": groups,
            "name": "Test User",
            "iat": now,
            "exp": now + 3600,
        });

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KID.to_string());
        jsonwebtoken::encode(&header, &claims, &self.encoding).expect("sign id token")
    }

    /// Answer token-endpoint requests for one grant type.
    pub async fn mount_token_grant(&self, grant_type: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Fail token-endpoint requests for one grant type.
    pub async fn mount_token_error(&self, grant_type: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&self.server)
            .await;
    }
}

pub fn token_manager() -> TokenManager {
    TokenManager::new(vec![0x41; 32], vec![0x42; 32]).expect("valid keys")
}

pub fn broker_config(issuer_url: &str, allowed_groups: Vec<String>) -> BrokerConfig {
    BrokerConfig {
        issuer_url: issuer_url.to_string(),
        client_id: CLIENT_ID.to_string(),
        cluster_name: "test-cluster".to_string(),
        cluster_server: "https://kubernetes.example.com:6443".to_string(),
        cluster_ca: "dGVzdC1jYQ==".to_string(),
        namespace: "default".to_string(),
        base_url: "https://kauth.example.com".to_string(),
        listen_addr: "127.0.0.1:0".parse().expect("addr"),
        tls: None,
        session_ttl: chrono::Duration::minutes(15),
        refresh_token_ttl: chrono::Duration::days(7),
        allowed_origins: vec![],
        allowed_groups,
        rate_limit_rps: 10_000.0,
        rate_limit_burst: 10_000,
        rotation_window: 2,
    }
}

/// A broker state backed by the mock provider and a fresh memory store.
pub async fn broker_state(idp: &TestIdp, allowed_groups: Vec<String>) -> (AppState, Arc<MemoryStore>) {
    let config = broker_config(&idp.issuer, allowed_groups);
    let provider = Provider::discover(
        &idp.issuer,
        CLIENT_ID,
        SecretString::from("secret".to_string()),
        &config.redirect_url(),
    )
    .await
    .expect("provider discovery");

    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, token_manager(), provider, store.clone());
    (state, store)
}

/// A broker state whose provider endpoints are unreachable; for routes that
/// never talk to the provider.
pub fn offline_state() -> (AppState, Arc<MemoryStore>) {
    offline_state_with_config(broker_config("https://issuer.invalid", vec![]))
}

/// Like [`offline_state`] but with a caller-tuned configuration (rate
/// limits, CORS origins, ...).
pub fn offline_state_with_config(config: BrokerConfig) -> (AppState, Arc<MemoryStore>) {
    let metadata = DiscoveryDocument {
        issuer: "https://issuer.invalid".to_string(),
        authorization_endpoint: "https://issuer.invalid/authorize".to_string(),
        token_endpoint: "https://issuer.invalid/token".to_string(),
        jwks_uri: "https://issuer.invalid/jwks".to_string(),
    };
    let provider = Provider::from_discovery(
        metadata,
        CLIENT_ID,
        SecretString::from("secret".to_string()),
        &config.redirect_url(),
        reqwest::Client::new(),
    )
    .expect("provider");

    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(config, token_manager(), provider, store.clone());
    (state, store)
}
