//! Tenant memberships and their authorization profiles

use crate::subject::Subject;
use crate::tenant::Tenant;
use chrono::Utc;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use warden_authorization::{Authorization, AuthorizationResult, SessionContext};
use warden_core::events::{
    AuthorizationGranted, AuthorizationRevoked, MembershipDisabled, MembershipEnabled,
    MembershipEstablished,
};
use warden_core::{Event, Listeners, MembershipId, Result, SubjectId, TenantId, WardenError};

/// Delivers membership events to the subject's and the tenant's listeners
#[derive(Clone)]
struct Fanout(Arc<Listeners>, Arc<Listeners>);

impl Fanout {
    fn emit(&self, event: impl Into<Event>) {
        let event = event.into();
        self.0.emit(&event);
        self.1.emit(&event);
    }
}

/// A subject's enrollment in a tenant
pub struct Membership {
    id: MembershipId,
    subject_id: SubjectId,
    subject: Weak<Subject>,
    tenant: Arc<Tenant>,
    nickname: String,
    subject_alias: Option<String>,
    enabled: Mutex<bool>,
    profile: AuthorizationProfile,
    fanout: Fanout,
}

impl Membership {
    /// Membership identifier
    pub fn id(&self) -> MembershipId {
        self.id
    }

    /// Member subject identifier
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    /// Member subject, while it is alive
    pub fn subject(&self) -> Option<Arc<Subject>> {
        self.subject.upgrade()
    }

    /// Name the subject goes by in this tenant
    ///
    /// The alias given at join time, otherwise the subject's own name.
    pub fn subject_name(&self) -> String {
        match (&self.subject_alias, self.subject.upgrade()) {
            (Some(alias), _) => alias.clone(),
            (None, Some(subject)) => subject.name().to_string(),
            (None, None) => self.subject_id.to_string(),
        }
    }

    /// The tenant joined
    pub fn tenant(&self) -> &Arc<Tenant> {
        &self.tenant
    }

    /// Subject-unique nickname
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Authorizations granted through this membership
    pub fn authorizations(&self) -> &AuthorizationProfile {
        &self.profile
    }

    /// Whether the membership can be used as a session profile
    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    /// Enable a disabled membership
    pub fn enable(&self) -> Result<MembershipEnabled> {
        self.set_enabled(true)?;
        let event = MembershipEnabled {
            subject_id: self.subject_id,
            tenant_id: self.tenant.id().clone(),
            membership_id: self.id,
            at: Utc::now(),
        };
        tracing::info!(membership = %self.id, tenant = %self.tenant.id(), "Membership enabled");
        self.fanout.emit(event.clone());
        Ok(event)
    }

    /// Disable an enabled membership
    ///
    /// If the membership is the profile of the subject's open session, the
    /// profile is detached first; the session stays open.
    pub fn disable(&self) -> Result<MembershipDisabled> {
        self.set_enabled(false)?;
        if let Some(session) = self.subject.upgrade().and_then(|s| s.current_session()) {
            session.detach_profile(self.id);
        }

        let event = MembershipDisabled {
            subject_id: self.subject_id,
            tenant_id: self.tenant.id().clone(),
            membership_id: self.id,
            at: Utc::now(),
        };
        tracing::info!(membership = %self.id, tenant = %self.tenant.id(), "Membership disabled");
        self.fanout.emit(event.clone());
        Ok(event)
    }

    fn set_enabled(&self, target: bool) -> Result<()> {
        let mut enabled = self.enabled.lock();
        if *enabled == target {
            let state = if target { "enabled" } else { "disabled" };
            return Err(WardenError::tenancy(
                self.tenant.id().clone(),
                format!("membership '{}' is already {state}", self.nickname),
            ));
        }
        *enabled = target;
        Ok(())
    }

    /// Run `f` while the membership is held enabled
    ///
    /// A concurrent `disable` waits until `f` returns.
    pub(crate) fn while_enabled<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let enabled = self.enabled.lock();
        if !*enabled {
            return Err(WardenError::tenancy(
                self.tenant.id().clone(),
                format!("membership '{}' is disabled", self.nickname),
            ));
        }
        let result = f();
        drop(enabled);
        result
    }

    /// Remember this membership as the subject's most recently used one
    pub(crate) fn note_used(&self) {
        if let Some(subject) = self.subject.upgrade() {
            subject.note_membership_used(&self.nickname);
        }
    }
}

impl fmt::Debug for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membership")
            .field("id", &self.id)
            .field("subject_id", &self.subject_id)
            .field("tenant", self.tenant.id())
            .field("nickname", &self.nickname)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// The authorizations one membership grants its subject
pub struct AuthorizationProfile {
    subject_id: SubjectId,
    tenant_id: TenantId,
    membership_id: MembershipId,
    grants: Mutex<Vec<Arc<dyn Authorization>>>,
    fanout: Fanout,
}

impl AuthorizationProfile {
    /// Snapshot of the granted authorizations
    pub fn authorizations(&self) -> Vec<Arc<dyn Authorization>> {
        self.grants.lock().clone()
    }

    /// Whether an authorization with this string form is granted
    pub fn contains(&self, authorization: &str) -> bool {
        self.grants.lock().iter().any(|a| a.as_string() == authorization)
    }

    /// Number of granted authorizations
    pub fn len(&self) -> usize {
        self.grants.lock().len()
    }

    /// Whether nothing is granted
    pub fn is_empty(&self) -> bool {
        self.grants.lock().is_empty()
    }

    /// Grant an authorization; `None` if an equal one is already granted
    pub fn grant(
        &self,
        authorization: Arc<dyn Authorization>,
        granted_by: &str,
    ) -> Option<AuthorizationGranted> {
        let token = authorization.as_string();
        {
            let mut grants = self.grants.lock();
            if grants.iter().any(|a| a.as_string() == token) {
                return None;
            }
            grants.push(authorization);
        }
        let event = AuthorizationGranted {
            subject_id: self.subject_id,
            tenant_id: self.tenant_id.clone(),
            membership_id: self.membership_id,
            authorization: token,
            granted_by: granted_by.to_string(),
            at: Utc::now(),
        };
        self.fanout.emit(event.clone());
        Some(event)
    }

    /// Revoke the authorization with this string form
    pub fn revoke(&self, authorization: &str, revoked_by: &str) -> Option<AuthorizationRevoked> {
        let removed = {
            let mut grants = self.grants.lock();
            let position = grants.iter().position(|a| a.as_string() == authorization)?;
            grants.remove(position)
        };
        Some(self.announce_revoked(removed.as_string(), revoked_by))
    }

    /// Revoke everything
    pub fn revoke_all(&self, revoked_by: &str) -> Vec<AuthorizationRevoked> {
        let removed = std::mem::take(&mut *self.grants.lock());
        removed
            .into_iter()
            .map(|a| self.announce_revoked(a.as_string(), revoked_by))
            .collect()
    }

    fn announce_revoked(&self, authorization: String, revoked_by: &str) -> AuthorizationRevoked {
        let event = AuthorizationRevoked {
            subject_id: self.subject_id,
            tenant_id: self.tenant_id.clone(),
            membership_id: self.membership_id,
            authorization,
            revoked_by: revoked_by.to_string(),
            at: Utc::now(),
        };
        self.fanout.emit(event.clone());
        event
    }

    /// Merge the verdicts of every granted authorization
    ///
    /// ABSTAIN when nothing is granted.
    pub fn evaluate(&self, session: &dyn SessionContext, instance: &dyn Any) -> AuthorizationResult {
        let grants = self.authorizations();
        AuthorizationResult::merge_all(grants.iter().map(|a| a.authorize(session, instance)))
    }
}

impl fmt::Debug for AuthorizationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationProfile")
            .field("membership_id", &self.membership_id)
            .field("grants", &self.len())
            .finish_non_exhaustive()
    }
}

/// Builds a membership of one subject in one tenant
#[must_use = "a membership is only established by join()"]
pub struct MembershipBuilder {
    subject: Arc<Subject>,
    tenant: Arc<Tenant>,
    nickname: Option<String>,
    subject_alias: Option<String>,
    grants: Vec<Arc<dyn Authorization>>,
    enabled: bool,
}

impl MembershipBuilder {
    pub(crate) fn new(subject: Arc<Subject>, tenant: Arc<Tenant>) -> Self {
        Self {
            subject,
            tenant,
            nickname: None,
            subject_alias: None,
            grants: Vec::new(),
            enabled: true,
        }
    }

    /// Nickname, unique among the subject's memberships
    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Name the subject goes by in the tenant
    pub fn subject_alias(mut self, alias: impl Into<String>) -> Self {
        self.subject_alias = Some(alias.into());
        self
    }

    /// Grant an authorization from the start
    pub fn grant(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.grants.push(authorization);
        self
    }

    /// Start disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Start enabled (the default)
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Establish the membership
    ///
    /// Fails with a tenancy error when the tenant or subject is disabled or
    /// the nickname is taken.
    pub fn join(self) -> Result<Arc<Membership>> {
        let tenant_id = self.tenant.id().clone();
        if !self.tenant.is_enabled() {
            return Err(WardenError::tenancy(tenant_id, "tenant is disabled"));
        }

        let fanout = Fanout(
            Arc::clone(self.subject.listeners()),
            Arc::clone(self.tenant.listeners()),
        );
        let subject = Arc::clone(&self.subject);
        let membership = subject.enroll(&tenant_id, self.nickname, |nickname| {
            let id = MembershipId::new();
            let mut grants: Vec<Arc<dyn Authorization>> = Vec::new();
            for grant in self.grants {
                if !grants.iter().any(|g| g.as_string() == grant.as_string()) {
                    grants.push(grant);
                }
            }
            Arc::new(Membership {
                id,
                subject_id: subject.id(),
                subject: Arc::downgrade(&subject),
                tenant: Arc::clone(&self.tenant),
                nickname,
                subject_alias: self.subject_alias,
                enabled: Mutex::new(self.enabled),
                profile: AuthorizationProfile {
                    subject_id: subject.id(),
                    tenant_id: tenant_id.clone(),
                    membership_id: id,
                    grants: Mutex::new(grants),
                    fanout: fanout.clone(),
                },
                fanout: fanout.clone(),
            })
        })?;

        let event = MembershipEstablished {
            subject_id: membership.subject_id,
            tenant_id: membership.tenant.id().clone(),
            membership_id: membership.id,
            nickname: membership.nickname.clone(),
            at: Utc::now(),
        };
        tracing::info!(
            subject = %membership.subject_id,
            tenant = %membership.tenant.id(),
            nickname = %membership.nickname,
            "Membership established"
        );
        membership.fanout.emit(event);
        Ok(membership)
    }
}
