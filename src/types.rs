//! NewType wrappers for strong typing throughout the gateway.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a refresh credential where an access credential is expected).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Short-lived bearer credential presented to prove identity for a
    /// single request window.
    ///
    /// Opaque to this layer: it is carried, never decoded. Verification is
    /// the identity provider's job (`get_user`). Never log the raw value;
    /// use [`fingerprint`] instead.
    AccessToken
);

newtype_string!(
    /// Long-lived credential exchanged for a new access credential without
    /// re-entering a password.
    ///
    /// Accepted exclusively from the httpOnly `refresh_token` cookie. Also
    /// serves as the coalescing key for in-flight refresh operations, so
    /// equality and hashing are on the raw value.
    RefreshToken
);

newtype_string!(
    /// User identifier assigned by the identity provider.
    ///
    /// This is the provider's stable subject ID (a UUID in practice). The
    /// directory keys `user` records by it, so it is distinct from an email,
    /// which may change.
    UserId
);

/// Short, stable fingerprint of a credential for log lines.
///
/// Raw tokens must never reach the logs; this hashes the value and keeps a
/// prefix long enough to correlate entries for the same credential.
pub fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}
