//! Unified error system for Warden
//!
//! A single error enum covers every crate. Callers that need the coarse category
//! rather than the exact variant use the predicates:
//!
//! ```text
//! identity errors ──┬── Identity, NoImplementationFound, UnsupportedCredential
//!                   └── Tenancy { tenant_id }
//! authentication ───┬── Authentication { subject_id }
//!                   └── SessionAlreadyStarted { subject_id, session_id }
//! definition ─────────── InvalidConstraintDefinition { resource }
//! authorization ──────── AccessDenied { action }
//! format ─────────────── UnsupportedFormat
//! lifecycle ──────────── IllegalState
//! ```

use crate::identifiers::{SessionId, SubjectId, TenantId};
use serde::{Deserialize, Serialize};

/// Unified error type for all Warden operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WardenError {
    /// The identity manager or one of its providers cannot operate correctly
    #[error("Identity error: {message}")]
    Identity {
        /// Error message describing the failure
        message: String,
    },

    /// No identity manager or provider implementation was accepted
    #[error("No implementation found: {message}")]
    NoImplementationFound {
        /// Error message describing what was searched for
        message: String,
    },

    /// An identity error concerning a specific tenant
    #[error("Tenancy error for tenant '{tenant_id}': {message}")]
    Tenancy {
        /// Tenant the failure concerns
        tenant_id: TenantId,
        /// Error message describing the failure
        message: String,
    },

    /// A credential could not be validated
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Subject whose authentication failed, when known
        subject_id: Option<SubjectId>,
        /// Error message describing the failure
        message: String,
    },

    /// A subject already has an open session
    #[error("Session '{session_id}' already exists for subject '{subject_id}'")]
    SessionAlreadyStarted {
        /// Subject owning the open session
        subject_id: SubjectId,
        /// The session that is already open
        session_id: SessionId,
    },

    /// A protected resource declares its constraints incorrectly
    #[error("Security constraints for resource '{resource}' are invalid: {message}")]
    InvalidConstraintDefinition {
        /// Resource type or action whose declaration is invalid
        resource: String,
        /// Error message describing the mistake
        message: String,
    },

    /// A protected action was not authorized for the calling session
    #[error("Access to '{action}' denied: {reason}")]
    AccessDenied {
        /// Resource action that was refused
        action: String,
        /// Why access was refused
        reason: String,
    },

    /// Input is not in a format the token or adapter understands
    #[error("Unsupported format: {message}")]
    UnsupportedFormat {
        /// Error message describing the rejected input
        message: String,
    },

    /// A credential adapter does not accept the given credential object
    #[error("Unsupported credential '{credential_type}': {message}")]
    UnsupportedCredential {
        /// Type name of the rejected credential object
        credential_type: String,
        /// Error message describing the rejection
        message: String,
    },

    /// Operation invoked outside the component's usable lifecycle
    #[error("Illegal state: {message}")]
    IllegalState {
        /// Error message describing the lifecycle violation
        message: String,
    },
}

impl WardenError {
    /// Create an identity error
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }

    /// Create a no-implementation-found error
    pub fn no_implementation(message: impl Into<String>) -> Self {
        Self::NoImplementationFound {
            message: message.into(),
        }
    }

    /// Create a tenancy error for the given tenant
    pub fn tenancy(tenant_id: TenantId, message: impl Into<String>) -> Self {
        Self::Tenancy {
            tenant_id,
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(subject_id: Option<SubjectId>, message: impl Into<String>) -> Self {
        Self::Authentication {
            subject_id,
            message: message.into(),
        }
    }

    /// Create a session-already-started conflict
    pub fn session_already_started(subject_id: SubjectId, session_id: SessionId) -> Self {
        Self::SessionAlreadyStarted {
            subject_id,
            session_id,
        }
    }

    /// Create an invalid constraint definition error
    pub fn invalid_definition(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConstraintDefinition {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create an access denied error
    pub fn access_denied(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /// Create an unsupported credential error
    pub fn unsupported_credential(
        credential_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsupportedCredential {
            credential_type: credential_type.into(),
            message: message.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// True for errors that prevent correct identity-manager operation
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            Self::Identity { .. }
                | Self::NoImplementationFound { .. }
                | Self::Tenancy { .. }
                | Self::UnsupportedCredential { .. }
        )
    }

    /// True for credential validation failures, including session conflicts
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::SessionAlreadyStarted { .. }
        )
    }

    /// True for resource declaration mistakes
    pub fn is_definition_error(&self) -> bool {
        matches!(self, Self::InvalidConstraintDefinition { .. })
    }

    /// The tenant a tenancy error concerns
    pub fn tenant_id(&self) -> Option<&TenantId> {
        match self {
            Self::Tenancy { tenant_id, .. } => Some(tenant_id),
            _ => None,
        }
    }
}

/// Standard Result type for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        Self::unsupported_format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = WardenError::identity("test message");
        assert!(matches!(err, WardenError::Identity { .. }));
        assert_eq!(err.to_string(), "Identity error: test message");
    }

    #[test]
    fn test_tenancy_is_identity_error() {
        let tenant = TenantId::from("acme");
        let err = WardenError::tenancy(tenant.clone(), "tenant is disabled");
        assert!(err.is_identity_error());
        assert!(!err.is_authentication_error());
        assert_eq!(err.tenant_id(), Some(&tenant));
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn test_session_conflict_names_both_ids() {
        let subject = SubjectId::new();
        let session = SessionId::new();
        let err = WardenError::session_already_started(subject, session);

        assert!(err.is_authentication_error());
        let msg = err.to_string();
        assert!(msg.contains(&subject.to_string()), "got: {msg}");
        assert!(msg.contains(&session.to_string()), "got: {msg}");
    }

    #[test]
    fn test_definition_error_category() {
        let err = WardenError::invalid_definition("Document", "no tenant accessor");
        assert!(err.is_definition_error());
        assert!(!err.is_identity_error());
        assert!(err.tenant_id().is_none());
    }
}
