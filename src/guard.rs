//! Keycloak bearer token guard.
//!
//! The guard owns everything that is shared between requests: the realm
//! configuration, the HTTP client and the realm's certificate document.
//! Per-request token state lives in a [`GuardSession`].

use std::sync::Arc;
use std::time::Duration;

use http::header::AUTHORIZATION;
use jsonwebtoken::{decode, decode_header};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::bearer::authorization_value;
use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};
use crate::keys::{self, HttpKeySetProvider, KeySetProvider};
use crate::session::GuardSession;
use crate::types::AccessToken;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Verifies Keycloak access tokens for one realm.
pub struct KeycloakGuard {
    config: GuardConfig,
    client: reqwest::Client,
    key_set_provider: Arc<dyn KeySetProvider>,
    /// Certificate document, filled on first use and never expired here.
    certificates: RwLock<Option<Value>>,
}

/// Builder for [`KeycloakGuard`].
pub struct KeycloakGuardBuilder {
    config: GuardConfig,
    timeout: Duration,
    client: Option<reqwest::Client>,
    key_set_provider: Option<Arc<dyn KeySetProvider>>,
    certificates: Option<Value>,
}

impl KeycloakGuardBuilder {
    /// Request timeout for the built-in client. Ignored with [`Self::http_client`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use an existing client instead of building one.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the default HTTP certificate fetch.
    pub fn key_set_provider(mut self, provider: Arc<dyn KeySetProvider>) -> Self {
        self.key_set_provider = Some(provider);
        self
    }

    /// Seed the certificate document so no fetch happens until it is reset.
    pub fn certificates(mut self, document: Value) -> Self {
        self.certificates = Some(document);
        self
    }

    /// Create the HTTP client unless one was supplied, then assemble the guard.
    pub fn build(self) -> GuardResult<KeycloakGuard> {
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder().timeout(self.timeout).build()?,
        };

        let key_set_provider = self
            .key_set_provider
            .unwrap_or_else(|| Arc::new(HttpKeySetProvider::new(client.clone())));

        Ok(KeycloakGuard {
            config: self.config,
            client,
            key_set_provider,
            certificates: RwLock::new(self.certificates),
        })
    }
}

impl KeycloakGuard {
    /// Create a guard with the default HTTP client and certificate fetch.
    pub fn new(config: GuardConfig) -> GuardResult<Self> {
        Self::builder(config).build()
    }

    /// Create a guard from a `{ "serverUrl": ..., "realm": ... }` option map.
    pub fn from_options(options: &Map<String, Value>) -> GuardResult<Self> {
        Self::new(GuardConfig::from_options(options)?)
    }

    /// Start a builder for overriding the timeout, client, provider or certificates.
    pub fn builder(config: GuardConfig) -> KeycloakGuardBuilder {
        KeycloakGuardBuilder {
            config,
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            client: None,
            key_set_provider: None,
            certificates: None,
        }
    }

    /// Realm configuration the guard was built with.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// The cached certificate document, if one has been fetched or set.
    pub async fn certificates(&self) -> Option<Value> {
        self.certificates.read().await.clone()
    }

    /// Inject a certificate document, bypassing the fetch in [`Self::pre_authenticate`].
    pub async fn set_certificates(&self, document: Value) {
        *self.certificates.write().await = Some(document);
    }

    /// Drop the cached document; the next authentication fetches it again.
    pub async fn reset_certificates(&self) {
        *self.certificates.write().await = None;
    }

    /// Make sure a certificate document is cached and return it.
    ///
    /// The key set provider is only consulted when nothing is cached.
    pub async fn pre_authenticate(&self) -> GuardResult<Value> {
        if let Some(document) = self.certificates.read().await.as_ref() {
            return Ok(document.clone());
        }

        let document = self
            .key_set_provider
            .fetch_key_set(&self.config.certs_url())
            .await?;

        *self.certificates.write().await = Some(document.clone());
        Ok(document)
    }

    /// Verify the session token and return its claims.
    ///
    /// An explicit `token` replaces the session token first. Verification
    /// errors from `jsonwebtoken` are returned unchanged as [`GuardError::Jwt`].
    pub async fn authenticate(
        &self,
        session: &mut GuardSession,
        token: Option<&str>,
    ) -> GuardResult<Value> {
        let token = resolve_token(session, token)?;
        let payload = self.verify(&token).await?;

        session.set_payload(payload.clone());
        Ok(payload)
    }

    /// Like [`Self::authenticate`], deserializing the claims into `C`.
    pub async fn authenticate_as<C: DeserializeOwned>(
        &self,
        session: &mut GuardSession,
        token: Option<&str>,
    ) -> GuardResult<C> {
        let payload = self.authenticate(session, token).await?;
        serde_json::from_value(payload).map_err(|e| GuardError::Jwt(e.into()))
    }

    /// Fetch the token owner's profile from the realm's userinfo endpoint.
    pub async fn owner_resource(
        &self,
        session: &mut GuardSession,
        token: Option<&str>,
    ) -> GuardResult<Value> {
        let token = resolve_token(session, token)?;
        let url = self.config.userinfo_url();
        debug!("Requesting userinfo from {}", url);

        let body = self
            .client
            .get(&url)
            .header(AUTHORIZATION, authorization_value(token.as_str()))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        Ok(body)
    }

    async fn verify(&self, token: &AccessToken) -> GuardResult<Value> {
        let document = self.pre_authenticate().await?;
        let key_set = keys::parse_key_set(&document)?;

        let header = decode_header(token.as_str())?;
        let jwk = keys::select_key(&key_set, header.kid.as_deref())?;
        let (decoding_key, validation) = keys::verification_for(jwk, &header)?;

        match decode::<Value>(token.as_str(), &decoding_key, &validation) {
            Ok(data) => {
                debug!("Token verified for realm {}", self.config.realm());
                Ok(data.claims)
            }
            Err(e) => {
                warn!("Token rejected for realm {}: {}", self.config.realm(), e);
                Err(e.into())
            }
        }
    }
}

fn resolve_token(session: &mut GuardSession, token: Option<&str>) -> GuardResult<AccessToken> {
    if let Some(raw) = token {
        session.set_access_token(raw);
    }

    session.access_token().cloned().ok_or(GuardError::MissingToken)
}
