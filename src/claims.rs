//! Typed view over the claims Keycloak puts in access tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Roles granted either realm-wide or for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Commonly used Keycloak access token claims.
///
/// Everything is optional; which claims are present depends on the realm's
/// client scopes and mappers. Unlisted claims are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeycloakClaims {
    /// Subject (user ID)
    pub sub: Option<String>,
    /// Issuer, `{serverUrl}/realms/{realm}`
    pub iss: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: Option<i64>,
    /// Issued at (Unix timestamp)
    pub iat: Option<i64>,
    /// Client the token was issued to
    pub azp: Option<String>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Space-separated scopes
    pub scope: Option<String>,
    #[serde(default)]
    pub realm_access: RoleSet,
    #[serde(default)]
    pub resource_access: HashMap<String, RoleSet>,
}

impl KeycloakClaims {
    pub fn has_realm_role(&self, role: &str) -> bool {
        self.realm_access.roles.iter().any(|r| r == role)
    }

    pub fn has_client_role(&self, client: &str, role: &str) -> bool {
        self.resource_access
            .get(client)
            .is_some_and(|access| access.roles.iter().any(|r| r == role))
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.as_deref().unwrap_or_default().split_whitespace()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}
