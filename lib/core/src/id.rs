//! Identifier types.
//!
//! User identifiers come from the messaging surface and are opaque strings
//! (a chat id, a phone number, an account handle). Exchange identifiers are
//! generated locally as ULIDs so log lines from one drain iteration sort
//! together.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Identifier of the user a conversation belongs to.
///
/// All queueing and single-flight guarantees are keyed by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseIdError {
                id_type: "UserId",
                reason: "user id must not be blank".to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier of one Conversation Loop invocation (one drain iteration).
    ExchangeId,
    "exch"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_displays_raw_value() {
        let id = UserId::new("chat:42");
        assert_eq!(id.to_string(), "chat:42");
        assert_eq!(id.as_str(), "chat:42");
    }

    #[test]
    fn blank_user_id_is_rejected() {
        let err = "  ".parse::<UserId>().unwrap_err();
        assert_eq!(err.id_type, "UserId");
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::from("u1")).expect("serialize");
        assert_eq!(json, "\"u1\"");
    }

    #[test]
    fn exchange_id_parses_with_and_without_prefix() {
        let id = ExchangeId::new();
        let with_prefix: ExchangeId = id.to_string().parse().expect("prefixed");
        let bare: ExchangeId = id.as_ulid().to_string().parse().expect("bare");
        assert_eq!(id, with_prefix);
        assert_eq!(id, bare);
        assert!(id.to_string().starts_with("exch_"));
    }

    #[test]
    fn exchange_id_rejects_garbage() {
        let err = "exch_nope".parse::<ExchangeId>().unwrap_err();
        assert_eq!(err.id_type, "ExchangeId");
    }
}
