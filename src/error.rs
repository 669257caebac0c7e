//! Error types for guard operations.
//!
//! Configuration and token-presence failures are defined here. Transport
//! failures and token verification failures are carried as-is from
//! `reqwest` and `jsonwebtoken`; `source()` hands back the original error.

use std::fmt;

/// Errors that can occur while configuring the guard or verifying a token.
#[derive(Debug)]
pub enum GuardError {
    /// An option name outside the accepted set was supplied.
    BadConfigurationKey(String),

    /// A mandatory option (`serverUrl` or `realm`) is absent or null.
    MandatoryOptionMissing(&'static str),

    /// A recognised option carried a value that is not a string.
    InvalidOptionValue(String),

    /// No access token was passed and none was stored in the session.
    MissingToken,

    /// The certificate document is not a JSON Web Key Set.
    MalformedKeySet(serde_json::Error),

    /// No key in the set matches the token header (`kid` when present).
    UnknownSigningKey(Option<String>),

    /// Transport failure or non-success status from Keycloak.
    Http(reqwest::Error),

    /// Token rejected by `jsonwebtoken` (signature, expiry, structure).
    Jwt(jsonwebtoken::errors::Error),
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadConfigurationKey(key) => {
                write!(f, "The property {} cannot be set in options.", key)
            }
            Self::MandatoryOptionMissing(option) => {
                write!(f, "The {} option is required.", option)
            }
            Self::InvalidOptionValue(key) => {
                write!(f, "The {} option must be a string.", key)
            }
            Self::MissingToken => write!(f, "AccessToken hasn't been provided."),
            Self::MalformedKeySet(e) => write!(f, "Malformed JWKS document: {}", e),
            Self::UnknownSigningKey(Some(kid)) => write!(f, "No signing key found for kid {}", kid),
            Self::UnknownSigningKey(None) => write!(f, "No signing key available in JWKS"),
            Self::Http(e) => write!(f, "{}", e),
            Self::Jwt(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedKeySet(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Jwt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GuardError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<jsonwebtoken::errors::Error> for GuardError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(err)
    }
}

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
