//! Bearer token string helpers.

use http::header::{AUTHORIZATION, HeaderName};

/// Scheme prefix used in `Authorization` headers.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Strip leading `Bearer ` prefixes from a raw header value or token.
///
/// Repeated prefixes are all removed, so the result never starts with
/// `Bearer ` and calling this on its own output is a no-op. Occurrences
/// after the start are left alone.
pub fn extract_access_token(raw: &str) -> &str {
    let mut token = raw;
    while let Some(rest) = token.strip_prefix(BEARER_PREFIX) {
        token = rest;
    }
    token
}

/// Build the `Authorization` header value for a token.
///
/// A value that already contains `Bearer ` anywhere is returned as-is.
pub fn authorization_value(token: &str) -> String {
    if token.contains(BEARER_PREFIX) {
        token.to_string()
    } else {
        format!("{}{}", BEARER_PREFIX, token)
    }
}

/// Build the `Authorization` header (name and value) for a token.
pub fn authorization_header(token: &str) -> (HeaderName, String) {
    (AUTHORIZATION, authorization_value(token))
}
