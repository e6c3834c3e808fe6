//! Subjects
//!
//! A [`Subject`] serializes all of its mutable state behind one lock.
//! Mutations are applied under the lock, the resulting events are collected,
//! and they are delivered to listeners only after the lock is released, so a
//! listener may freely call back into the subject.
//!
//! ```text
//! authenticate(candidate)
//!   ├─ every credential rejects ──▶ failed_attempts += 1, authentication error
//!   │                                (lockout disables the subject when configured)
//!   └─ one credential accepts ───▶ failed_attempts = 0
//!        ├─ no open session ─────▶ open one at the credential's level   [SessionOpened]
//!        └─ open session ────────▶ raise its level if higher            [AssuranceElevated]
//!                                                                        [SubjectAuthenticated]
//! ```

use crate::config::DirectoryConfig;
use crate::membership::{Membership, MembershipBuilder};
use crate::session::Session;
use crate::tenant::Tenant;
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use warden_authentication::{Candidate, Credential};
use warden_core::events::{
    AssuranceElevated, CredentialGranted, CredentialRevoked, SubjectAuthenticated,
    SubjectDisabled, SubjectEnabled,
};
use warden_core::listeners::ListenerResult;
use warden_core::{
    AssuranceLevel, Event, ListenerId, Listeners, MembershipId, Result, SubjectId, TenantId, WardenError,
};

/// Actor recorded when the lockout policy disables a subject
const LOCKOUT_ACTOR: &str = "authentication";

struct SubjectState {
    enabled: bool,
    credentials: IndexMap<String, Box<dyn Credential>>,
    failed_attempts: u32,
    last_authenticated: Option<SubjectAuthenticated>,
    memberships: IndexMap<MembershipId, Arc<Membership>>,
    session: Option<Arc<Session>>,
    last_used_membership: Option<String>,
}

impl SubjectState {
    fn open_session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref().filter(|s| s.is_open())
    }
}

/// A security principal
pub struct Subject {
    id: SubjectId,
    name: String,
    nickname_prefix: String,
    max_failed_attempts: u32,
    listeners: Arc<Listeners>,
    state: Mutex<SubjectState>,
}

impl Subject {
    /// Create an enabled subject with default directory settings
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_config(name, &DirectoryConfig::default())
    }

    /// Create an enabled subject governed by `config`
    pub fn with_config(name: impl Into<String>, config: &DirectoryConfig) -> Arc<Self> {
        Arc::new(Self {
            id: SubjectId::new(),
            name: name.into(),
            nickname_prefix: config.nickname_prefix.clone(),
            max_failed_attempts: config.max_failed_attempts,
            listeners: Arc::new(Listeners::new()),
            state: Mutex::new(SubjectState {
                enabled: true,
                credentials: IndexMap::new(),
                failed_attempts: 0,
                last_authenticated: None,
                memberships: IndexMap::new(),
                session: None,
                last_used_membership: None,
            }),
        })
    }

    /// Subject identifier
    pub fn id(&self) -> SubjectId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listeners for this subject's events, including its sessions' events
    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    /// Register a listener for every event of this subject
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.listeners.on_any(listener)
    }

    /// Unregister a listener
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Whether the subject may authenticate
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Consecutive failed authentications since the last success
    pub fn failed_attempts(&self) -> u32 {
        self.state.lock().failed_attempts
    }

    /// The most recent successful authentication
    pub fn last_authenticated(&self) -> Option<SubjectAuthenticated> {
        self.state.lock().last_authenticated.clone()
    }

    /// String forms of the granted credentials, in grant order
    pub fn credentials(&self) -> Vec<String> {
        self.state.lock().credentials.keys().cloned().collect()
    }

    /// Whether a credential with this string form is granted
    pub fn has_credential(&self, credential: &str) -> bool {
        self.state.lock().credentials.contains_key(credential)
    }

    /// Add a credential
    ///
    /// Returns `None` when an equal credential is already granted. Fails if
    /// the credential is bound to another subject.
    pub fn grant_credential(
        &self,
        credential: Box<dyn Credential>,
    ) -> Result<Option<CredentialGranted>> {
        if credential.subject_id() != self.id {
            return Err(WardenError::identity(format!(
                "credential '{}' belongs to subject '{}', not '{}'",
                credential.as_string(),
                credential.subject_id(),
                self.id
            )));
        }

        let key = credential.as_string();
        {
            let mut state = self.state.lock();
            if state.credentials.contains_key(&key) {
                return Ok(None);
            }
            state.credentials.insert(key.clone(), credential);
        }

        let event = CredentialGranted {
            subject_id: self.id,
            credential: key,
            at: Utc::now(),
        };
        tracing::debug!(subject = %self.id, credential = %event.credential, "Credential granted");
        self.listeners.emit(&Event::from(event.clone()));
        Ok(Some(event))
    }

    /// Remove a credential by string form; `None` if it was not granted
    pub fn revoke_credential(&self, credential: &str) -> Option<CredentialRevoked> {
        self.state.lock().credentials.shift_remove(credential)?;

        let event = CredentialRevoked {
            subject_id: self.id,
            credential: credential.to_string(),
            at: Utc::now(),
        };
        tracing::debug!(subject = %self.id, credential, "Credential revoked");
        self.listeners.emit(&Event::from(event.clone()));
        Some(event)
    }

    /// Authenticate with a candidate value
    pub fn authenticate(&self, candidate: &Candidate) -> Result<SubjectAuthenticated> {
        self.authenticate_inner(candidate, None)
    }

    /// Authenticate, recording where the candidate came from
    pub fn authenticate_from(
        &self,
        candidate: &Candidate,
        remote_address: &str,
    ) -> Result<SubjectAuthenticated> {
        self.authenticate_inner(candidate, Some(remote_address))
    }

    fn authenticate_inner(
        &self,
        candidate: &Candidate,
        remote_address: Option<&str>,
    ) -> Result<SubjectAuthenticated> {
        let mut events: Vec<Event> = Vec::new();
        let mut closed = None;

        let outcome = {
            let mut state = self.state.lock();
            if !state.enabled {
                return Err(WardenError::authentication(
                    Some(self.id),
                    "subject is disabled",
                ));
            }

            let accepted = state
                .credentials
                .values_mut()
                .find_map(|credential| match credential.authenticate(candidate) {
                    Ok(event) => Some(event),
                    Err(err) => {
                        tracing::debug!(
                            subject = %self.id,
                            credential = credential.credential_type(),
                            error = %err,
                            "Credential rejected candidate"
                        );
                        None
                    }
                });

            match accepted {
                Some(authenticated) => {
                    state.failed_attempts = 0;
                    let level = authenticated.assurance_level;

                    let session = match state.open_session() {
                        Some(session) => {
                            if session.elevate(level).is_some() {
                                events.push(Event::from(AssuranceElevated {
                                    subject_id: self.id,
                                    session_id: session.id(),
                                    credential_type: authenticated.credential_type.clone(),
                                    assurance_level: level,
                                    at: Utc::now(),
                                }));
                            }
                            Arc::clone(session)
                        }
                        None => {
                            let (session, opened) = Session::open(
                                self.id,
                                &authenticated.credential_type,
                                level,
                                Arc::clone(&self.listeners),
                            );
                            tracing::info!(
                                subject = %self.id,
                                session = %session.id(),
                                assurance = %level,
                                "Session opened"
                            );
                            events.push(Event::from(opened));
                            state.session = Some(Arc::clone(&session));
                            session
                        }
                    };

                    let mut authenticated = authenticated.for_session(session.id());
                    if let Some(address) = remote_address {
                        authenticated = authenticated.with_remote_address(address);
                    }
                    state.last_authenticated = Some(authenticated.clone());
                    events.push(Event::from(authenticated.clone()));
                    Ok(authenticated)
                }
                None => {
                    state.failed_attempts += 1;
                    let attempts = state.failed_attempts;
                    tracing::warn!(
                        subject = %self.id,
                        attempts,
                        remote_address,
                        "Authentication failed"
                    );

                    if self.max_failed_attempts > 0 && attempts >= self.max_failed_attempts {
                        state.enabled = false;
                        closed = self.shut_session(&state, LOCKOUT_ACTOR);
                        events.push(Event::from(SubjectDisabled {
                            subject_id: self.id,
                            disabled_by: LOCKOUT_ACTOR.to_string(),
                            reason: format!("{attempts} failed authentication attempts"),
                            at: Utc::now(),
                        }));
                        tracing::warn!(subject = %self.id, attempts, "Subject locked out");
                    }

                    Err(WardenError::authentication(
                        Some(self.id),
                        if state.credentials.is_empty() {
                            "subject has no credentials".to_string()
                        } else {
                            format!("no credential accepted the candidate ({attempts} failed attempts)")
                        },
                    ))
                }
            }
        };

        if let Some(notice) = closed {
            notice.deliver();
        }
        for event in &events {
            self.listeners.emit(event);
        }
        outcome
    }

    /// Open a session without authenticating
    ///
    /// Fails with a session conflict naming the open session if there is one.
    pub fn open_session(&self, created_by: &str) -> Result<Arc<Session>> {
        let (session, opened) = {
            let mut state = self.state.lock();
            if !state.enabled {
                return Err(WardenError::authentication(
                    Some(self.id),
                    "subject is disabled",
                ));
            }
            if let Some(existing) = state.open_session() {
                return Err(WardenError::session_already_started(self.id, existing.id()));
            }
            let (session, opened) = Session::open(
                self.id,
                created_by,
                AssuranceLevel::NONE,
                Arc::clone(&self.listeners),
            );
            state.session = Some(Arc::clone(&session));
            (session, opened)
        };

        tracing::info!(subject = %self.id, session = %session.id(), by = created_by, "Session opened");
        self.listeners.emit(&Event::from(opened));
        Ok(session)
    }

    /// The subject's open session
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.state.lock().open_session().cloned()
    }

    /// Whether the subject has an open session
    pub fn is_session_open(&self) -> bool {
        self.state.lock().open_session().is_some()
    }

    /// Re-enable a disabled subject; no session is reopened
    pub fn enable(&self, enabled_by: &str) -> Result<SubjectEnabled> {
        {
            let mut state = self.state.lock();
            if state.enabled {
                return Err(WardenError::identity(format!(
                    "subject '{}' is already enabled",
                    self.id
                )));
            }
            state.enabled = true;
            state.failed_attempts = 0;
        }

        let event = SubjectEnabled {
            subject_id: self.id,
            enabled_by: enabled_by.to_string(),
            at: Utc::now(),
        };
        tracing::info!(subject = %self.id, by = enabled_by, "Subject enabled");
        self.listeners.emit(&Event::from(event.clone()));
        Ok(event)
    }

    /// Disable the subject, closing its open session first
    ///
    /// Listeners see the session's close event before the disable event.
    pub fn disable(&self, disabled_by: &str, reason: &str) -> Result<SubjectDisabled> {
        let closed = {
            let mut state = self.state.lock();
            if !state.enabled {
                return Err(WardenError::identity(format!(
                    "subject '{}' is already disabled",
                    self.id
                )));
            }
            state.enabled = false;
            self.shut_session(&state, disabled_by)
        };

        if let Some(notice) = closed {
            notice.deliver();
        }
        let event = SubjectDisabled {
            subject_id: self.id,
            disabled_by: disabled_by.to_string(),
            reason: reason.to_string(),
            at: Utc::now(),
        };
        tracing::info!(subject = %self.id, by = disabled_by, reason, "Subject disabled");
        self.listeners.emit(&Event::from(event.clone()));
        Ok(event)
    }

    fn shut_session(
        &self,
        state: &SubjectState,
        closed_by: &str,
    ) -> Option<crate::session::ClosedNotice> {
        let session = state.open_session().filter(|s| !s.is_system())?;
        session.shut(closed_by)
    }

    /// Start building a membership of this subject in `tenant`
    pub fn create_membership(self: &Arc<Self>, tenant: &Arc<Tenant>) -> MembershipBuilder {
        MembershipBuilder::new(Arc::clone(self), Arc::clone(tenant))
    }

    /// All memberships, in the order they were established
    pub fn memberships(&self) -> Vec<Arc<Membership>> {
        self.state.lock().memberships.values().cloned().collect()
    }

    /// Membership with the given nickname
    pub fn membership(&self, nickname: &str) -> Option<Arc<Membership>> {
        self.state
            .lock()
            .memberships
            .values()
            .find(|m| m.nickname() == nickname)
            .cloned()
    }

    /// Nickname of the membership most recently selected as a session profile
    pub fn last_used_membership(&self) -> Option<String> {
        self.state.lock().last_used_membership.clone()
    }

    pub(crate) fn note_membership_used(&self, nickname: &str) {
        self.state.lock().last_used_membership = Some(nickname.to_string());
    }

    /// Register a new membership under a unique nickname
    ///
    /// `make` builds the membership once the nickname is settled; it runs
    /// under the subject lock and must not call back into the subject.
    pub(crate) fn enroll<F>(
        &self,
        tenant_id: &TenantId,
        nickname: Option<String>,
        make: F,
    ) -> Result<Arc<Membership>>
    where
        F: FnOnce(String) -> Arc<Membership>,
    {
        let mut state = self.state.lock();
        if !state.enabled {
            return Err(WardenError::tenancy(
                tenant_id.clone(),
                format!("subject '{}' is disabled", self.id),
            ));
        }

        let taken = |candidate: &str| state.memberships.values().any(|m| m.nickname() == candidate);
        let nickname = match nickname {
            Some(nickname) if nickname.trim().is_empty() => {
                return Err(WardenError::tenancy(
                    tenant_id.clone(),
                    "membership nickname must not be empty",
                ));
            }
            Some(nickname) if taken(&nickname) => {
                return Err(WardenError::tenancy(
                    tenant_id.clone(),
                    format!("subject '{}' already has a membership named '{nickname}'", self.id),
                ));
            }
            Some(nickname) => nickname,
            None => (1..)
                .map(|n| format!("{}-{n}", self.nickname_prefix))
                .find(|candidate| !taken(candidate))
                .unwrap_or_else(|| format!("{}-{}", self.nickname_prefix, MembershipId::new())),
        };

        let membership = make(nickname);
        state.memberships.insert(membership.id(), Arc::clone(&membership));
        Ok(membership)
    }

    /// Bind the directory's system session to this subject
    pub(crate) fn attach_system_session(&self, session: Arc<Session>) {
        self.state.lock().session = Some(session);
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &state.enabled)
            .field("credentials", &state.credentials.len())
            .field("memberships", &state.memberships.len())
            .field("session", &state.session.as_ref().map(|s| s.id()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use warden_authentication::SharedSecretCredential;
    use warden_core::EventKind;

    fn with_secret(subject: &Subject, secret: &str, level: AssuranceLevel) -> String {
        let credential = SharedSecretCredential::new(subject.id(), secret, level);
        subject
            .grant_credential(Box::new(credential))
            .unwrap()
            .unwrap()
            .credential
    }

    #[test]
    fn credentials_of_other_subjects_are_refused() {
        let alice = Subject::new("alice");
        let bob = Subject::new("bob");
        let foreign = SharedSecretCredential::new(bob.id(), "secret", AssuranceLevel::LEVEL_1);
        assert!(alice.grant_credential(Box::new(foreign)).unwrap_err().is_identity_error());
    }

    #[test]
    fn revoked_credentials_no_longer_authenticate() {
        let subject = Subject::new("alice");
        let key = with_secret(&subject, "hunter22", AssuranceLevel::LEVEL_1);
        assert!(subject.has_credential(&key));

        assert!(subject.revoke_credential(&key).is_some());
        assert!(subject.revoke_credential(&key).is_none());
        assert!(subject
            .authenticate(&Candidate::secret("hunter22"))
            .unwrap_err()
            .is_authentication_error());
    }

    #[test]
    fn success_opens_then_elevates_the_session() {
        let subject = Subject::new("alice");
        with_secret(&subject, "low", AssuranceLevel::LEVEL_1);
        with_secret(&subject, "high", AssuranceLevel::LEVEL_3);

        let first = subject.authenticate(&Candidate::secret("low")).unwrap();
        let session = subject.current_session().unwrap();
        assert_eq!(first.session_id, Some(session.id()));
        assert_eq!(session.assurance_level(), AssuranceLevel::LEVEL_1);

        subject
            .authenticate_from(&Candidate::secret("high"), "10.0.0.7")
            .unwrap();
        assert_eq!(subject.current_session().unwrap().id(), session.id());
        assert_eq!(session.assurance_level(), AssuranceLevel::LEVEL_3);
        assert_eq!(
            subject.last_authenticated().unwrap().remote_address.as_deref(),
            Some("10.0.0.7")
        );
    }

    #[test]
    fn failures_are_counted_and_reset() {
        let subject = Subject::new("alice");
        with_secret(&subject, "right", AssuranceLevel::LEVEL_1);

        assert!(subject.authenticate(&Candidate::secret("wrong")).is_err());
        assert!(subject.authenticate(&Candidate::secret("wrong")).is_err());
        assert_eq!(subject.failed_attempts(), 2);
        assert!(subject.is_enabled());

        subject.authenticate(&Candidate::secret("right")).unwrap();
        assert_eq!(subject.failed_attempts(), 0);
    }

    #[test]
    fn lockout_disables_after_the_configured_failures() {
        let config = DirectoryConfig {
            max_failed_attempts: 2,
            ..DirectoryConfig::default()
        };
        let subject = Subject::with_config("alice", &config);
        with_secret(&subject, "right", AssuranceLevel::LEVEL_1);
        let session = subject.open_session("test").unwrap();

        assert!(subject.authenticate(&Candidate::secret("wrong")).is_err());
        assert!(subject.authenticate(&Candidate::secret("wrong")).is_err());
        assert!(!subject.is_enabled());
        assert!(!session.is_open());
        assert!(subject.authenticate(&Candidate::secret("right")).is_err());

        subject.enable("admin").unwrap();
        assert_eq!(subject.failed_attempts(), 0);
        assert!(subject.authenticate(&Candidate::secret("right")).is_ok());
    }

    #[test]
    fn second_session_is_a_conflict() {
        let subject = Subject::new("alice");
        let session = subject.open_session("test").unwrap();
        assert_matches!(
            subject.open_session("test"),
            Err(WardenError::SessionAlreadyStarted { subject_id, session_id })
                if subject_id == subject.id() && session_id == session.id()
        );

        session.close("test").unwrap();
        assert!(!subject.is_session_open());
        assert!(subject.open_session("test").is_ok());
    }

    #[test]
    fn enable_and_disable_reject_repeats() {
        let subject = Subject::new("alice");
        assert!(subject.enable("admin").unwrap_err().is_identity_error());
        subject.disable("admin", "leaving").unwrap();
        assert!(subject.disable("admin", "leaving").is_err());
        assert!(subject.open_session("test").is_err());
    }

    #[test]
    fn listeners_can_be_removed() {
        let subject = Subject::new("alice");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = subject.add_listener(move |event| {
            sink.lock().push(event.kind());
            Ok(())
        });

        subject.open_session("test").unwrap();
        assert!(subject.remove_listener(id));
        subject.disable("admin", "done").unwrap();
        assert_eq!(*seen.lock(), vec![EventKind::SessionOpened]);
    }
}
