//! NewType wrappers for the strings the guard passes around.
//!
//! These keep a realm name from being handed where a server URL or a token
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a `String` wrapper that serialises as a bare JSON string and
/// compares directly against `&str`.
macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(
    /// Base URL of the Keycloak server (e.g., "https://sso.example.com").
    ///
    /// Realm endpoints are built by appending `/realms/{realm}/...` to it.
    ServerUrl
);

string_newtype!(
    /// Keycloak realm name (e.g., "master", "acme").
    RealmName
);

string_newtype!(
    /// Raw compact JWT, without any `Bearer ` prefix.
    ///
    /// Only [`crate::bearer::extract_access_token`] output is stored in a
    /// session, so the inner value is what gets verified and forwarded.
    AccessToken
);
