//! Provider signing keys, fetched from the discovered JWKS endpoint and
//! cached per `kid`. An unknown `kid` triggers one refetch before failing,
//! which covers routine provider key rotation.

use std::collections::HashMap;
use std::sync::RwLock;

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tracing::debug;

use super::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

pub struct JwksCache {
    url: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
}

impl JwksCache {
    #[must_use]
    pub fn new(url: String, http: reqwest::Client) -> Self {
        Self {
            url,
            http,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the decoding key for a token `kid`.
    ///
    /// # Errors
    /// [`Error::UnknownKey`] when the key is absent even after a refetch,
    /// [`Error::Http`] on JWKS endpoint failures.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, Error> {
        if let Some(jwk) = self.lookup(kid) {
            return decoding_key_from(&jwk);
        }

        self.refresh().await?;

        let jwk = self
            .lookup(kid)
            .ok_or_else(|| Error::UnknownKey(kid.to_string()))?;
        decoding_key_from(&jwk)
    }

    fn lookup(&self, kid: &str) -> Option<Jwk> {
        self.keys
            .read()
            .ok()
            .and_then(|keys| keys.get(kid).cloned())
    }

    async fn refresh(&self) -> Result<(), Error> {
        let set: JwkSet = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let fresh: HashMap<String, Jwk> = set
            .keys
            .into_iter()
            .filter_map(|jwk| jwk.kid.clone().map(|kid| (kid, jwk)))
            .collect();
        debug!(keys = fresh.len(), "refreshed provider JWKS");

        if let Ok(mut keys) = self.keys.write() {
            *keys = fresh;
        }
        Ok(())
    }
}

fn decoding_key_from(jwk: &Jwk) -> Result<DecodingKey, Error> {
    if jwk.kty != "RSA" {
        return Err(Error::Verification(format!(
            "unsupported key type {}",
            jwk.kty
        )));
    }
    let n = jwk
        .n
        .as_deref()
        .ok_or_else(|| Error::Verification("JWK missing modulus".to_string()))?;
    let e = jwk
        .e
        .as_deref()
        .ok_or_else(|| Error::Verification("JWK missing exponent".to_string()))?;

    DecodingKey::from_rsa_components(n, e).map_err(|err| Error::Verification(err.to_string()))
}
