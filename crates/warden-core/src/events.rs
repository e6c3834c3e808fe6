//! State-transition events
//!
//! Each event is produced by exactly one state transition and is the only
//! supported way of observing that transition. Events are immutable and
//! timestamped; two events are equal when their identity fields are equal,
//! regardless of when they were recorded.

use crate::assurance::AssuranceLevel;
use crate::identifiers::{MembershipId, SessionId, SubjectId, SubscriberId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Implements equality and hashing over the listed identity fields only.
macro_rules! identity_fields {
    ($name:ident => $($field:ident),+ $(,)?) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                $(self.$field == other.$field)&&+
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                $(self.$field.hash(state);)+
            }
        }
    };
}

/// A credential was added to a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialGranted {
    /// Subject receiving the credential
    pub subject_id: SubjectId,
    /// String form of the granted credential
    pub credential: String,
    /// When the grant was applied
    pub at: DateTime<Utc>,
}
identity_fields!(CredentialGranted => subject_id, credential);

/// A credential was removed from a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRevoked {
    /// Subject losing the credential
    pub subject_id: SubjectId,
    /// String form of the revoked credential
    pub credential: String,
    /// When the revocation was applied
    pub at: DateTime<Utc>,
}
identity_fields!(CredentialRevoked => subject_id, credential);

/// A disabled subject was re-enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectEnabled {
    /// Subject that was enabled
    pub subject_id: SubjectId,
    /// Actor that enabled the subject
    pub enabled_by: String,
    /// When the subject was enabled
    pub at: DateTime<Utc>,
}
identity_fields!(SubjectEnabled => subject_id, enabled_by, at);

/// A subject was disabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDisabled {
    /// Subject that was disabled
    pub subject_id: SubjectId,
    /// Actor that disabled the subject
    pub disabled_by: String,
    /// Why the subject was disabled
    pub reason: String,
    /// When the subject was disabled
    pub at: DateTime<Utc>,
}
identity_fields!(SubjectDisabled => subject_id, disabled_by, reason);

/// A tenant was enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEnabled {
    /// Tenant that was enabled
    pub tenant_id: TenantId,
    /// Actor that enabled the tenant
    pub enabled_by: String,
    /// When the tenant was enabled
    pub at: DateTime<Utc>,
}
identity_fields!(TenantEnabled => tenant_id, at);

/// A tenant was disabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDisabled {
    /// Tenant that was disabled
    pub tenant_id: TenantId,
    /// Actor that disabled the tenant
    pub disabled_by: String,
    /// Why the tenant was disabled
    pub reason: String,
    /// When the tenant was disabled
    pub at: DateTime<Utc>,
}
identity_fields!(TenantDisabled => tenant_id, at);

/// A subject joined a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEstablished {
    /// Joining subject
    pub subject_id: SubjectId,
    /// Joined tenant
    pub tenant_id: TenantId,
    /// The new membership
    pub membership_id: MembershipId,
    /// Subject-unique membership nickname
    pub nickname: String,
    /// When the membership was established
    pub at: DateTime<Utc>,
}
identity_fields!(MembershipEstablished => subject_id, tenant_id, nickname);

/// A membership was enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEnabled {
    /// Member subject
    pub subject_id: SubjectId,
    /// Tenant of the membership
    pub tenant_id: TenantId,
    /// The membership
    pub membership_id: MembershipId,
    /// When the membership was enabled
    pub at: DateTime<Utc>,
}
identity_fields!(MembershipEnabled => membership_id, at);

/// A membership was disabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipDisabled {
    /// Member subject
    pub subject_id: SubjectId,
    /// Tenant of the membership
    pub tenant_id: TenantId,
    /// The membership
    pub membership_id: MembershipId,
    /// When the membership was disabled
    pub at: DateTime<Utc>,
}
identity_fields!(MembershipDisabled => membership_id, at);

/// A session was opened for a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOpened {
    /// Session owner
    pub subject_id: SubjectId,
    /// The new session
    pub session_id: SessionId,
    /// Actor that opened the session
    pub created_by: String,
    /// When the session was opened
    pub at: DateTime<Utc>,
}
identity_fields!(SessionOpened => subject_id, session_id);

/// A session was closed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClosed {
    /// Session owner
    pub subject_id: SubjectId,
    /// The closed session
    pub session_id: SessionId,
    /// Actor that closed the session
    pub closed_by: String,
    /// When the session was closed
    pub at: DateTime<Utc>,
}
identity_fields!(SessionClosed => subject_id, session_id);

/// The session switched to a membership profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfileChanged {
    /// Session owner
    pub subject_id: SubjectId,
    /// The session
    pub session_id: SessionId,
    /// Membership now used as the session profile
    pub membership_id: MembershipId,
    /// Tenancy that came with the membership
    pub tenant_id: TenantId,
    /// When the profile changed
    pub at: DateTime<Utc>,
}
identity_fields!(SessionProfileChanged => subject_id, session_id, membership_id);

/// The session profile was removed, leaving the session without tenancy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfileCleared {
    /// Session owner
    pub subject_id: SubjectId,
    /// The session
    pub session_id: SessionId,
    /// When the profile was removed
    pub at: DateTime<Utc>,
}
identity_fields!(SessionProfileCleared => subject_id, session_id);

/// A session property was set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPropertyChanged {
    /// Session owner
    pub subject_id: SubjectId,
    /// The session
    pub session_id: SessionId,
    /// Property name
    pub name: String,
    /// New property value
    pub value: String,
    /// When the property changed
    pub at: DateTime<Utc>,
}
identity_fields!(SessionPropertyChanged => session_id, name, value);

/// A subscriber reported activity on a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberHeartbeat {
    /// Reporting subscriber
    pub subscriber_id: SubscriberId,
    /// The session
    pub session_id: SessionId,
    /// When the heartbeat was received
    pub at: DateTime<Utc>,
}
identity_fields!(SubscriberHeartbeat => subscriber_id, session_id);

/// A subscriber detached from a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUnbound {
    /// Session owner
    pub subject_id: SubjectId,
    /// The session
    pub session_id: SessionId,
    /// Detached subscriber
    pub subscriber_id: SubscriberId,
    /// When the subscriber detached
    pub at: DateTime<Utc>,
}
identity_fields!(SessionUnbound => subject_id, session_id, subscriber_id);

/// A subject was successfully authenticated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectAuthenticated {
    /// Authenticated subject
    pub subject_id: SubjectId,
    /// Session the authentication applies to, once one is bound
    pub session_id: Option<SessionId>,
    /// Type of the credential that succeeded
    pub credential_type: String,
    /// Assurance level the credential provides
    pub assurance_level: AssuranceLevel,
    /// Remote address of the authenticating party, when known
    pub remote_address: Option<String>,
    /// When the authentication happened
    pub at: DateTime<Utc>,
}
identity_fields!(SubjectAuthenticated => subject_id, credential_type, at);

impl SubjectAuthenticated {
    /// Record a successful authentication happening now
    pub fn now(
        subject_id: SubjectId,
        credential_type: impl Into<String>,
        assurance_level: AssuranceLevel,
    ) -> Self {
        Self {
            subject_id,
            session_id: None,
            credential_type: credential_type.into(),
            assurance_level,
            remote_address: None,
            at: Utc::now(),
        }
    }

    /// Attach the remote address of the authenticating party
    #[must_use]
    pub fn with_remote_address(mut self, remote_address: impl Into<String>) -> Self {
        self.remote_address = Some(remote_address.into());
        self
    }

    /// Attach the session the authentication applies to
    #[must_use]
    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// A session's assurance level increased
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssuranceElevated {
    /// Session owner
    pub subject_id: SubjectId,
    /// The session
    pub session_id: SessionId,
    /// Credential type that raised the level
    pub credential_type: String,
    /// New assurance level
    pub assurance_level: AssuranceLevel,
    /// When the level was raised
    pub at: DateTime<Utc>,
}
identity_fields!(AssuranceElevated => session_id, credential_type, assurance_level);

/// An authorization was granted to a membership profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationGranted {
    /// Member subject
    pub subject_id: SubjectId,
    /// Tenant of the membership
    pub tenant_id: TenantId,
    /// Membership owning the profile
    pub membership_id: MembershipId,
    /// String form of the authorization
    pub authorization: String,
    /// Actor that granted the authorization
    pub granted_by: String,
    /// When the authorization was granted
    pub at: DateTime<Utc>,
}
identity_fields!(AuthorizationGranted => membership_id, authorization, granted_by, at);

/// An authorization was revoked from a membership profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRevoked {
    /// Member subject
    pub subject_id: SubjectId,
    /// Tenant of the membership
    pub tenant_id: TenantId,
    /// Membership owning the profile
    pub membership_id: MembershipId,
    /// String form of the authorization
    pub authorization: String,
    /// Actor that revoked the authorization
    pub revoked_by: String,
    /// When the authorization was revoked
    pub at: DateTime<Utc>,
}
identity_fields!(AuthorizationRevoked => membership_id, authorization, revoked_by, at);

/// Discriminant of [`Event`], used to key listener tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// [`CredentialGranted`]
    CredentialGranted,
    /// [`CredentialRevoked`]
    CredentialRevoked,
    /// [`SubjectEnabled`]
    SubjectEnabled,
    /// [`SubjectDisabled`]
    SubjectDisabled,
    /// [`TenantEnabled`]
    TenantEnabled,
    /// [`TenantDisabled`]
    TenantDisabled,
    /// [`MembershipEstablished`]
    MembershipEstablished,
    /// [`MembershipEnabled`]
    MembershipEnabled,
    /// [`MembershipDisabled`]
    MembershipDisabled,
    /// [`SessionOpened`]
    SessionOpened,
    /// [`SessionClosed`]
    SessionClosed,
    /// [`SessionProfileChanged`]
    SessionProfileChanged,
    /// [`SessionProfileCleared`]
    SessionProfileCleared,
    /// [`SessionPropertyChanged`]
    SessionPropertyChanged,
    /// [`SubscriberHeartbeat`]
    SubscriberHeartbeat,
    /// [`SessionUnbound`]
    SessionUnbound,
    /// [`SubjectAuthenticated`]
    SubjectAuthenticated,
    /// [`AssuranceElevated`]
    AssuranceElevated,
    /// [`AuthorizationGranted`]
    AuthorizationGranted,
    /// [`AuthorizationRevoked`]
    AuthorizationRevoked,
}

impl EventKind {
    /// Every event kind
    pub const ALL: [EventKind; 20] = [
        Self::CredentialGranted,
        Self::CredentialRevoked,
        Self::SubjectEnabled,
        Self::SubjectDisabled,
        Self::TenantEnabled,
        Self::TenantDisabled,
        Self::MembershipEstablished,
        Self::MembershipEnabled,
        Self::MembershipDisabled,
        Self::SessionOpened,
        Self::SessionClosed,
        Self::SessionProfileChanged,
        Self::SessionProfileCleared,
        Self::SessionPropertyChanged,
        Self::SubscriberHeartbeat,
        Self::SessionUnbound,
        Self::SubjectAuthenticated,
        Self::AssuranceElevated,
        Self::AuthorizationGranted,
        Self::AuthorizationRevoked,
    ];
}

/// Any state-transition event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A credential was granted
    CredentialGranted(CredentialGranted),
    /// A credential was revoked
    CredentialRevoked(CredentialRevoked),
    /// A subject was enabled
    SubjectEnabled(SubjectEnabled),
    /// A subject was disabled
    SubjectDisabled(SubjectDisabled),
    /// A tenant was enabled
    TenantEnabled(TenantEnabled),
    /// A tenant was disabled
    TenantDisabled(TenantDisabled),
    /// A membership was established
    MembershipEstablished(MembershipEstablished),
    /// A membership was enabled
    MembershipEnabled(MembershipEnabled),
    /// A membership was disabled
    MembershipDisabled(MembershipDisabled),
    /// A session was opened
    SessionOpened(SessionOpened),
    /// A session was closed
    SessionClosed(SessionClosed),
    /// A session profile was selected
    SessionProfileChanged(SessionProfileChanged),
    /// A session profile was removed
    SessionProfileCleared(SessionProfileCleared),
    /// A session property changed
    SessionPropertyChanged(SessionPropertyChanged),
    /// A subscriber sent a heartbeat
    SubscriberHeartbeat(SubscriberHeartbeat),
    /// A subscriber detached
    SessionUnbound(SessionUnbound),
    /// A subject authenticated
    SubjectAuthenticated(SubjectAuthenticated),
    /// A session's assurance level increased
    AssuranceElevated(AssuranceElevated),
    /// An authorization was granted
    AuthorizationGranted(AuthorizationGranted),
    /// An authorization was revoked
    AuthorizationRevoked(AuthorizationRevoked),
}

macro_rules! event_conversions {
    ($($variant:ident),+ $(,)?) => {
        impl Event {
            /// The kind of this event
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Self::$variant(_) => EventKind::$variant,)+
                }
            }

            /// When the transition happened
            pub fn at(&self) -> DateTime<Utc> {
                match self {
                    $(Self::$variant(event) => event.at,)+
                }
            }
        }

        $(
            impl From<$variant> for Event {
                fn from(event: $variant) -> Self {
                    Self::$variant(event)
                }
            }
        )+
    };
}

event_conversions!(
    CredentialGranted,
    CredentialRevoked,
    SubjectEnabled,
    SubjectDisabled,
    TenantEnabled,
    TenantDisabled,
    MembershipEstablished,
    MembershipEnabled,
    MembershipDisabled,
    SessionOpened,
    SessionClosed,
    SessionProfileChanged,
    SessionProfileCleared,
    SessionPropertyChanged,
    SubscriberHeartbeat,
    SessionUnbound,
    SubjectAuthenticated,
    AssuranceElevated,
    AuthorizationGranted,
    AuthorizationRevoked,
);

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialGranted(e) => write!(f, "New credential for subject '{}'", e.subject_id),
            Self::CredentialRevoked(e) => {
                write!(f, "Credential revoked from subject '{}'", e.subject_id)
            }
            Self::SubjectEnabled(e) => write!(
                f,
                "Subject '{}' has been enabled by '{}'",
                e.subject_id, e.enabled_by
            ),
            Self::SubjectDisabled(e) => write!(
                f,
                "Subject '{}' has been disabled by '{}' due to '{}'",
                e.subject_id, e.disabled_by, e.reason
            ),
            Self::TenantEnabled(e) => write!(f, "Tenant '{}' has been enabled", e.tenant_id),
            Self::TenantDisabled(e) => write!(
                f,
                "Tenant '{}' has been disabled due to '{}'",
                e.tenant_id, e.reason
            ),
            Self::MembershipEstablished(e) => write!(
                f,
                "Membership '{}' created for subject '{}' with tenant '{}'",
                e.nickname, e.subject_id, e.tenant_id
            ),
            Self::MembershipEnabled(e) => write!(f, "Membership '{}' enabled", e.membership_id),
            Self::MembershipDisabled(e) => write!(f, "Membership '{}' disabled", e.membership_id),
            Self::SessionOpened(e) => write!(
                f,
                "Security session '{}' was opened at '{}' by '{}'",
                e.session_id,
                e.at.to_rfc3339(),
                e.created_by
            ),
            Self::SessionClosed(e) => write!(
                f,
                "Security session '{}' was closed by '{}' at '{}'",
                e.session_id,
                e.closed_by,
                e.at.to_rfc3339()
            ),
            Self::SessionProfileChanged(e) => write!(
                f,
                "Subject '{}' has changed its profile to '{}' on session '{}'",
                e.subject_id, e.membership_id, e.session_id
            ),
            Self::SessionProfileCleared(e) => write!(
                f,
                "The session profile for subject '{}' on session '{}' has been removed",
                e.subject_id, e.session_id
            ),
            Self::SessionPropertyChanged(e) => write!(
                f,
                "Property '{}' on session '{}' has changed",
                e.name, e.session_id
            ),
            Self::SubscriberHeartbeat(e) => write!(
                f,
                "Subscriber '{}' sent heartbeat to session '{}'",
                e.subscriber_id, e.session_id
            ),
            Self::SessionUnbound(e) => write!(
                f,
                "Subscriber '{}' has unsubscribed from session '{}'",
                e.subscriber_id, e.session_id
            ),
            Self::SubjectAuthenticated(e) => write!(
                f,
                "Subject '{}' was authenticated at assurance level {} from {}",
                e.subject_id,
                e.assurance_level,
                e.remote_address.as_deref().unwrap_or("UNKNOWN")
            ),
            Self::AssuranceElevated(e) => write!(
                f,
                "Assurance level has been elevated to {} for subject '{}' session '{}'",
                e.assurance_level, e.subject_id, e.session_id
            ),
            Self::AuthorizationGranted(e) => write!(
                f,
                "Authorization '{}' was granted to subject '{}' in tenant '{}' by '{}'",
                e.authorization, e.subject_id, e.tenant_id, e.granted_by
            ),
            Self::AuthorizationRevoked(e) => write!(
                f,
                "Authorization '{}' was revoked from subject '{}' in tenant '{}' by '{}'",
                e.authorization, e.subject_id, e.tenant_id, e.revoked_by
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_equality_ignores_non_identity_fields() {
        let subject_id = SubjectId::new();
        let session_id = SessionId::new();
        let first = SessionClosed {
            subject_id,
            session_id,
            closed_by: "admin".to_string(),
            at: Utc::now(),
        };
        let second = SessionClosed {
            closed_by: "system".to_string(),
            at: first.at + Duration::seconds(5),
            ..first.clone()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_kind_matches_variant() {
        let event: Event = SessionProfileCleared {
            subject_id: SubjectId::new(),
            session_id: SessionId::new(),
            at: Utc::now(),
        }
        .into();
        assert_eq!(event.kind(), EventKind::SessionProfileCleared);
        assert!(EventKind::ALL.contains(&event.kind()));
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event: Event = TenantEnabled {
            tenant_id: TenantId::from("acme"),
            enabled_by: "root".to_string(),
            at: Utc::now(),
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tenant_enabled");
        assert_eq!(json["tenant_id"], "acme");
    }
}
