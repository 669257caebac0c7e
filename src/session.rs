//! Request-scoped token state.

use serde_json::Value;

use crate::bearer::extract_access_token;
use crate::types::AccessToken;

/// Access token and last verified payload for one caller.
///
/// A session is created per request (or per connection) and handed to the
/// guard by `&mut`, so one guard can serve concurrent callers without their
/// tokens or payloads crossing.
#[derive(Debug, Clone, Default)]
pub struct GuardSession {
    access_token: Option<AccessToken>,
    payload: Option<Value>,
}

impl GuardSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session from a raw token or `Authorization` header value.
    pub fn with_access_token(raw: &str) -> Self {
        let mut session = Self::new();
        session.set_access_token(raw);
        session
    }

    /// Store a token, stripping a leading `Bearer `.
    ///
    /// Replacing the token drops any payload verified for the previous one.
    pub fn set_access_token(&mut self, raw: &str) -> &mut Self {
        self.access_token = Some(AccessToken::new(extract_access_token(raw)));
        self.payload = None;
        self
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    /// Claims from the last successful authentication of the current token.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.payload.is_some()
    }

    pub(crate) fn set_payload(&mut self, payload: Value) {
        self.payload = Some(payload);
    }
}
