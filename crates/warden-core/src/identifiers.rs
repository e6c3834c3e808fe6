//! Core identifier types
//!
//! Subjects, sessions, memberships and subscribers are identified by random
//! UUIDs that are never reused. Tenant identifiers are compared by their string
//! identity against values read off protected resources, so [`TenantId`] wraps
//! a string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from a UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn uuid(&self) -> Uuid {
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
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// Globally unique, immutable, never-reused security subject identifier
    SubjectId,
    "subject"
);

uuid_identifier!(
    /// Security session identifier
    SessionId,
    "session"
);

uuid_identifier!(
    /// Tenant membership identifier
    MembershipId,
    "membership"
);

uuid_identifier!(
    /// Session subscriber identifier
    SubscriberId,
    "subscriber"
);

/// Globally unique tenant identifier
///
/// Tenancy checks compare this identifier's string form against the owner
/// reported by a resource, so any string is a valid tenant id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new random tenant identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier's string identity
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_unique() {
        assert_ne!(SubjectId::new(), SubjectId::new());
        assert_ne!(TenantId::new(), TenantId::new());
    }

    #[test]
    fn test_display_and_parse() {
        let id = SessionId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("session-"));
        assert_eq!(shown.parse::<SessionId>().unwrap(), id);
        assert_eq!(id.uuid().to_string().parse::<SessionId>().unwrap(), id);
    }

    #[test]
    fn test_tenant_id_string_identity() {
        let tenant = TenantId::from("T1");
        assert_eq!(tenant.as_str(), "T1");
        assert_eq!(tenant.to_string(), "T1");
        assert_eq!(serde_json::to_string(&tenant).unwrap(), "\"T1\"");
    }
}
