//! Keycloak bearer token guard.
//!
//! Verifies access tokens issued by a Keycloak realm against the realm's
//! JWKS certificates, and fetches the token owner's profile from the
//! realm's userinfo endpoint.
//!
//! ## Usage
//!
//! ```ignore
//! let guard = KeycloakGuard::new(GuardConfig::new("https://sso.example.com", "acme"))?;
//!
//! // One session per request
//! let mut session = GuardSession::new();
//! let claims = guard.authenticate(&mut session, Some(authorization_header)).await?;
//! let profile = guard.owner_resource(&mut session, None).await?;
//! ```

pub mod bearer;
pub mod claims;
pub mod config;
pub mod error;
pub mod guard;
pub mod keys;
pub mod session;
pub mod types;

pub use bearer::{authorization_header, authorization_value, extract_access_token};
pub use claims::{KeycloakClaims, RoleSet};
pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
pub use guard::{DEFAULT_HTTP_TIMEOUT_SECONDS, KeycloakGuard, KeycloakGuardBuilder};
pub use keys::{HttpKeySetProvider, KeySetProvider, StaticKeySetProvider};
pub use session::GuardSession;
pub use types::{AccessToken, RealmName, ServerUrl};
