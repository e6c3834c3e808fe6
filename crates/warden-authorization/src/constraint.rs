//! Constraints, authorizations and the session view they evaluate against

use crate::result::AuthorizationResult;
use std::any::Any;
use std::fmt;
use warden_core::{AssuranceLevel, SessionId, SubjectId, TenantId};

/// What an authorization may observe about the calling session
pub trait SessionContext: Send + Sync {
    /// Subject the session belongs to
    fn subject_id(&self) -> SubjectId;

    /// Session identifier
    fn session_id(&self) -> SessionId;

    /// Tenant of the current profile, absent when no profile is active
    fn tenancy(&self) -> Option<TenantId>;

    /// Highest assurance achieved during the session
    fn assurance_level(&self) -> AssuranceLevel;

    /// Whether this is the process's own session
    fn is_system(&self) -> bool {
        false
    }
}

/// A provider-specific restriction on a resource action
///
/// Constraints are created and owned by their issuing provider. The identity
/// string is stable and serializable, e.g. `tenant:Document#tenant`.
pub trait Constraint: Any + Send + Sync + fmt::Debug {
    /// Stable identity of the constraint
    fn identity(&self) -> String;

    /// Upcast for provider-side downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Runtime evaluator bound to a constraint
pub trait Authorization: Send + Sync + fmt::Debug {
    /// Evaluate against a session and a resource instance
    ///
    /// Must be total: failures are logged and reported as
    /// [`AuthorizationResult::Denied`], never propagated. May evaluate other
    /// actions through the engine that is running it.
    fn authorize(&self, session: &dyn SessionContext, instance: &dyn Any) -> AuthorizationResult;

    /// String form used in grant/revoke events
    fn as_string(&self) -> String;
}
