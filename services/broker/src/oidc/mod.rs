//! OIDC provider adapter.
//!
//! Wraps discovery, the authorization-code + PKCE exchange, the
//! refresh-token grant and ID-token verification behind one type. All
//! provider I/O carries a 30 second deadline; the broker never waits longer
//! than that on the identity provider.

use std::time::Duration;

use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;

mod error;
mod jwks;
pub mod pkce;

pub use error::Error;

use jwks::JwksCache;

/// Scopes requested when none are configured. `offline_access` is what makes
/// the provider hand out a refresh token.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile", "groups", "offline_access"];

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// The provider's `/.well-known/openid-configuration` document, reduced to
/// the endpoints the broker exercises.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

/// Token endpoint response for both the code exchange and the refresh grant.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Seconds until the issued token expires; 0 when the provider did not
    /// say.
    #[must_use]
    pub fn expires_in_secs(&self) -> i64 {
        self.expires_in.unwrap_or(0).max(0)
    }
}

/// Claims the broker consumes from a verified ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdClaims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub: String,
}

pub struct Provider {
    issuer: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
    scopes: Vec<String>,
    http: reqwest::Client,
    jwks: JwksCache,
}

impl Provider {
    /// Discover the provider's endpoints from its issuer URL.
    ///
    /// # Errors
    /// [`Error::Http`] on discovery failures, [`Error::Discovery`] when the
    /// document is inconsistent with the configured issuer.
    pub async fn discover(
        issuer_url: &str,
        client_id: &str,
        client_secret: SecretString,
        redirect_url: &str,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer_url.trim_end_matches('/')
        );
        debug!(%discovery_url, "discovering OIDC provider");
        let metadata: DiscoveryDocument = http
            .get(&discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if metadata.issuer.trim_end_matches('/') != issuer_url.trim_end_matches('/') {
            return Err(Error::Discovery(format!(
                "issuer mismatch: discovery says {}",
                metadata.issuer
            )));
        }

        Self::from_discovery(metadata, client_id, client_secret, redirect_url, http)
    }

    /// Build a provider from an already fetched discovery document.
    ///
    /// # Errors
    /// [`Error::Discovery`] when the document carries unparseable endpoints.
    pub fn from_discovery(
        metadata: DiscoveryDocument,
        client_id: &str,
        client_secret: SecretString,
        redirect_url: &str,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        let authorization_endpoint = Url::parse(&metadata.authorization_endpoint)
            .map_err(|err| Error::Discovery(format!("bad authorization_endpoint: {err}")))?;
        let token_endpoint = Url::parse(&metadata.token_endpoint)
            .map_err(|err| Error::Discovery(format!("bad token_endpoint: {err}")))?;

        let jwks = JwksCache::new(metadata.jwks_uri.clone(), http.clone());

        Ok(Self {
            issuer: metadata.issuer,
            authorization_endpoint,
            token_endpoint,
            client_id: client_id.to_string(),
            client_secret,
            redirect_url: redirect_url.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            http,
            jwks,
        })
    }

    /// The provider URL the user's browser is sent to.
    #[must_use]
    pub fn authorization_url(&self, state: &str, verifier: &str) -> String {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce::code_challenge(verifier))
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline");
        url.to_string()
    }

    /// Exchange an authorization code, binding it to the PKCE verifier.
    ///
    /// # Errors
    /// [`Error::Http`] / [`Error::TokenEndpoint`] on exchange failures.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, Error> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_url),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
            ("code_verifier", verifier),
        ])
        .await
    }

    /// Ask the provider for a fresh token pair from a refresh token.
    ///
    /// # Errors
    /// [`Error::Http`] / [`Error::TokenEndpoint`] on grant failures.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::TokenEndpoint {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }

    /// Verify an ID token against the provider's signing keys and this
    /// client's audience, then decode its claims.
    ///
    /// # Errors
    /// [`Error::Verification`] for any signature, issuer, audience or expiry
    /// failure; [`Error::UnknownKey`] when the token's key is not in the
    /// provider's JWKS.
    pub async fn verify_id_token(&self, raw: &str) -> Result<IdClaims, Error> {
        let header =
            decode_header(raw).map_err(|err| Error::Verification(format!("bad header: {err}")))?;
        let kid = header
            .kid
            .ok_or_else(|| Error::Verification("token missing key ID".to_string()))?;

        let key = self.jwks.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.client_id]);

        let data = decode::<IdClaims>(raw, &key, &validation).map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let reason = match err.kind() {
                ErrorKind::ExpiredSignature => "token has expired",
                ErrorKind::InvalidIssuer => "invalid issuer",
                ErrorKind::InvalidAudience => "invalid audience",
                ErrorKind::InvalidSignature => "invalid signature",
                _ => "token validation failed",
            };
            Error::Verification(reason.to_string())
        })?;

        Ok(data.claims)
    }
}
