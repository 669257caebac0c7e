//! JWKS (JSON Web Key Set) retrieval and signing key selection.
//!
//! The certificate document is kept as opaque JSON by the guard. It is only
//! parsed into a [`JwkSet`] when a token is verified, and the key matching
//! the token header is turned into a `jsonwebtoken` [`DecodingKey`].

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{GuardError, GuardResult};

/// Source of the realm's certificate document.
///
/// The guard calls this only when it holds no document yet. Implementations
/// decide where the document comes from: the network, a shared cache, a file.
#[async_trait]
pub trait KeySetProvider: Send + Sync {
    async fn fetch_key_set(&self, certs_url: &str) -> GuardResult<Value>;
}

/// Fetches the document from the Keycloak certs endpoint.
#[derive(Debug, Clone)]
pub struct HttpKeySetProvider {
    client: reqwest::Client,
}

impl HttpKeySetProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeySetProvider for HttpKeySetProvider {
    async fn fetch_key_set(&self, certs_url: &str) -> GuardResult<Value> {
        debug!("Fetching JWKS from {}", certs_url);

        let document = self
            .client
            .get(certs_url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(document)
    }
}

/// Serves a fixed document, e.g. one fetched earlier and cached by the caller.
#[derive(Debug, Clone)]
pub struct StaticKeySetProvider {
    document: Value,
}

impl StaticKeySetProvider {
    pub fn new(document: Value) -> Self {
        Self { document }
    }
}

#[async_trait]
impl KeySetProvider for StaticKeySetProvider {
    async fn fetch_key_set(&self, _certs_url: &str) -> GuardResult<Value> {
        Ok(self.document.clone())
    }
}

/// Certificate document with each key still as raw JSON.
#[derive(Debug, Deserialize)]
struct RawKeySet {
    keys: Vec<Value>,
}

/// Parse a certificate document as a JWK set.
///
/// Keys `jsonwebtoken` cannot model (unknown `kty`, unsupported `alg`) are
/// skipped so the remaining keys stay usable. Only a document without a
/// `keys` array is rejected.
pub fn parse_key_set(document: &Value) -> GuardResult<JwkSet> {
    let raw = RawKeySet::deserialize(document).map_err(GuardError::MalformedKeySet)?;

    let mut keys = Vec::with_capacity(raw.keys.len());
    for entry in raw.keys {
        let kid = entry.get("kid").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<Jwk>(entry) {
            Ok(jwk) => keys.push(jwk),
            Err(e) => debug!("Skipping unsupported JWK {:?}: {}", kid, e),
        }
    }

    Ok(JwkSet { keys })
}

/// Pick the key a token was signed with.
///
/// With a `kid` the key must match it exactly. Without one, the first key
/// not reserved for encryption is used.
pub fn select_key<'a>(key_set: &'a JwkSet, kid: Option<&str>) -> GuardResult<&'a Jwk> {
    match kid {
        Some(kid) => key_set
            .find(kid)
            .ok_or_else(|| GuardError::UnknownSigningKey(Some(kid.to_string()))),
        None => key_set
            .keys
            .iter()
            .find(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .ok_or(GuardError::UnknownSigningKey(None)),
    }
}

/// Build the decoding key and validation rules for a token header.
///
/// The algorithm is taken from the header; `jsonwebtoken` rejects it when it
/// does not fit the key family, and a key that pins `alg` must agree with it.
pub fn verification_for(jwk: &Jwk, header: &Header) -> GuardResult<(DecodingKey, Validation)> {
    if let Some(key_alg) = &jwk.common.key_algorithm
        && !same_algorithm(key_alg, header.alg)
    {
        return Err(GuardError::Jwt(ErrorKind::InvalidAlgorithm.into()));
    }

    let decoding_key = DecodingKey::from_jwk(jwk)?;

    let mut validation = Validation::new(header.alg);
    // No audience is configured for the guard.
    validation.validate_aud = false;

    Ok((decoding_key, validation))
}

fn same_algorithm(key_alg: &KeyAlgorithm, alg: Algorithm) -> bool {
    // Both enums serialize to their JOSE names ("RS256", "ES384", ...).
    match (serde_json::to_value(key_alg), serde_json::to_value(alg)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
