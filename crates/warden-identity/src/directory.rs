//! Identity managers and the in-memory directory
//!
//! An [`IdentityManager`] resolves subjects, sessions and tenants, owns the
//! system session, and binds sessions to [`ExecutionContext`]s.
//!
//! ```text
//! Created ──initialize(config)──▶ Running ──shutdown()──▶ ShutDown (terminal)
//! ```
//!
//! Lookups report "not found" as `Ok(None)`; errors are reserved for calls
//! made outside the running state.

use crate::config::DirectoryConfig;
use crate::context::ExecutionContext;
use crate::session::Session;
use crate::subject::Subject;
use crate::tenant::Tenant;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use warden_authentication::Credential;
use warden_core::{ProviderConfig, Result, SessionId, SubjectId, TenantId, WardenError};

/// Resolves identities and tracks per-context session bindings
pub trait IdentityManager: Send + Sync {
    /// Implementation name, used when selecting among candidates
    fn name(&self) -> &str;

    /// Prepare the manager; must succeed before any other call
    fn initialize(&self, config: &ProviderConfig) -> Result<()>;

    /// The session representing the process itself
    fn system_session(&self) -> Result<Arc<Session>>;

    /// Session bound to `context`, if it is still open
    fn execution_session(&self, context: &ExecutionContext) -> Result<Option<Arc<Session>>>;

    /// Bind a session to `context`; `None` clears the binding
    fn set_execution_session(
        &self,
        context: &mut ExecutionContext,
        session: Option<Arc<Session>>,
    ) -> Result<()>;

    /// Open session with this identifier
    fn find_session(&self, id: SessionId) -> Result<Option<Arc<Session>>>;

    /// Subject with this identifier
    fn find_subject(&self, id: SubjectId) -> Result<Option<Arc<Subject>>>;

    /// Subject that holds `credential`
    fn find_subject_by_credential(&self, credential: &dyn Credential)
        -> Result<Option<Arc<Subject>>>;

    /// Tenant with this identifier
    fn find_tenant(&self, id: &TenantId) -> Result<Option<Arc<Tenant>>>;

    /// Release everything; later calls fail
    fn shutdown(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    ShutDown,
}

struct DirectoryState {
    lifecycle: Lifecycle,
    config: DirectoryConfig,
    system: Option<(Arc<Subject>, Arc<Session>)>,
    subjects: HashMap<SubjectId, Arc<Subject>>,
    tenants: HashMap<TenantId, Arc<Tenant>>,
}

impl DirectoryState {
    fn ensure_running(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Running => Ok(()),
            Lifecycle::Created => Err(WardenError::illegal_state("directory is not initialized")),
            Lifecycle::ShutDown => Err(WardenError::illegal_state("directory has been shut down")),
        }
    }
}

/// Identity manager keeping everything in process memory
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

/// Name under which [`InMemoryDirectory`] is offered for selection
pub const IN_MEMORY_DIRECTORY: &str = "in-memory";

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    /// Create an uninitialized directory
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DirectoryState {
                lifecycle: Lifecycle::Created,
                config: DirectoryConfig::default(),
                system: None,
                subjects: HashMap::new(),
                tenants: HashMap::new(),
            }),
        }
    }

    /// Effective configuration
    pub fn config(&self) -> DirectoryConfig {
        self.state.read().config.clone()
    }

    /// Create and register an enabled subject
    pub fn create_subject(&self, name: &str) -> Result<Arc<Subject>> {
        let mut state = self.state.write();
        state.ensure_running()?;
        let subject = Subject::with_config(name, &state.config);
        state.subjects.insert(subject.id(), Arc::clone(&subject));
        tracing::debug!(subject = %subject.id(), name, "Subject created");
        Ok(subject)
    }

    /// Create and register an enabled tenant
    pub fn create_tenant(&self, id: TenantId, name: &str) -> Result<Arc<Tenant>> {
        let mut state = self.state.write();
        state.ensure_running()?;
        if state.tenants.contains_key(&id) {
            return Err(WardenError::tenancy(id, "tenant already exists"));
        }
        let tenant = Tenant::new(id.clone(), name);
        state.tenants.insert(id, Arc::clone(&tenant));
        tracing::debug!(tenant = %tenant.id(), name, "Tenant created");
        Ok(tenant)
    }

    /// Unbind subscribers idle for longer than the configured timeout
    ///
    /// Returns how many subscribers were unbound.
    pub fn expire_idle_subscribers(&self, now: DateTime<Utc>) -> Result<usize> {
        let (sessions, timeout) = {
            let state = self.state.read();
            state.ensure_running()?;
            (open_sessions(&state), state.config.idle_timeout)
        };
        Ok(sessions
            .iter()
            .map(|session| session.expire_idle(now, timeout).len())
            .sum())
    }
}

fn open_sessions(state: &DirectoryState) -> Vec<Arc<Session>> {
    state
        .system
        .iter()
        .map(|(_, session)| Arc::clone(session))
        .chain(
            state
                .subjects
                .values()
                .filter_map(|s| s.current_session())
                .filter(|s| !s.is_system()),
        )
        .collect()
}

impl IdentityManager for InMemoryDirectory {
    fn name(&self) -> &str {
        IN_MEMORY_DIRECTORY
    }

    fn initialize(&self, config: &ProviderConfig) -> Result<()> {
        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Created {
            return Err(WardenError::identity("directory is already initialized"));
        }
        let settings = DirectoryConfig::from_provider_config(config)?;

        let system_subject = Subject::with_config(settings.system_name.as_str(), &settings);
        let system_session = Session::system(
            system_subject.id(),
            &settings.system_name,
            Arc::clone(system_subject.listeners()),
        );
        system_subject.attach_system_session(Arc::clone(&system_session));
        state
            .subjects
            .insert(system_subject.id(), Arc::clone(&system_subject));

        tracing::info!(
            system_subject = %system_subject.id(),
            system_session = %system_session.id(),
            idle_timeout_secs = settings.idle_timeout.as_secs(),
            "Directory initialized"
        );
        state.system = Some((system_subject, system_session));
        state.config = settings;
        state.lifecycle = Lifecycle::Running;
        Ok(())
    }

    fn system_session(&self) -> Result<Arc<Session>> {
        let state = self.state.read();
        state.ensure_running()?;
        state
            .system
            .as_ref()
            .map(|(_, session)| Arc::clone(session))
            .ok_or_else(|| WardenError::illegal_state("directory has no system session"))
    }

    fn execution_session(&self, context: &ExecutionContext) -> Result<Option<Arc<Session>>> {
        self.state.read().ensure_running()?;
        Ok(context.bound().filter(|s| s.is_open()).cloned())
    }

    fn set_execution_session(
        &self,
        context: &mut ExecutionContext,
        session: Option<Arc<Session>>,
    ) -> Result<()> {
        self.state.read().ensure_running()?;
        if let Some(session) = &session {
            if !session.is_open() {
                return Err(WardenError::illegal_state(format!(
                    "session '{}' is closed and cannot be bound",
                    session.id()
                )));
            }
        }
        tracing::debug!(
            context = context.label().unwrap_or("-"),
            session = ?session.as_ref().map(|s| s.id()),
            "Execution session bound"
        );
        context.bind(session);
        Ok(())
    }

    fn find_session(&self, id: SessionId) -> Result<Option<Arc<Session>>> {
        let state = self.state.read();
        state.ensure_running()?;
        Ok(open_sessions(&state).into_iter().find(|s| s.id() == id))
    }

    fn find_subject(&self, id: SubjectId) -> Result<Option<Arc<Subject>>> {
        let state = self.state.read();
        state.ensure_running()?;
        Ok(state.subjects.get(&id).cloned())
    }

    fn find_subject_by_credential(
        &self,
        credential: &dyn Credential,
    ) -> Result<Option<Arc<Subject>>> {
        let state = self.state.read();
        state.ensure_running()?;
        let key = credential.as_string();
        Ok(state
            .subjects
            .get(&credential.subject_id())
            .filter(|s| s.has_credential(&key))
            .cloned())
    }

    fn find_tenant(&self, id: &TenantId) -> Result<Option<Arc<Tenant>>> {
        let state = self.state.read();
        state.ensure_running()?;
        Ok(state.tenants.get(id).cloned())
    }

    fn shutdown(&self) {
        let notices = {
            let mut state = self.state.write();
            if state.lifecycle == Lifecycle::ShutDown {
                return;
            }
            let notices: Vec<_> = state
                .subjects
                .values()
                .filter_map(|s| s.current_session())
                .filter(|s| !s.is_system())
                .filter_map(|s| s.shut("directory shutdown"))
                .collect();
            state.subjects.clear();
            state.tenants.clear();
            state.system = None;
            state.lifecycle = Lifecycle::ShutDown;
            notices
        };
        let closed = notices.len();
        for notice in notices {
            notice.deliver();
        }
        tracing::info!(closed_sessions = closed, "Directory shut down");
    }
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryDirectory")
            .field("lifecycle", &state.lifecycle)
            .field("subjects", &state.subjects.len())
            .field("tenants", &state.tenants.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn running() -> InMemoryDirectory {
        let directory = InMemoryDirectory::new();
        directory.initialize(&ProviderConfig::new()).unwrap();
        directory
    }

    #[test]
    fn calls_before_initialize_fail() {
        let directory = InMemoryDirectory::new();
        assert_matches!(directory.system_session(), Err(WardenError::IllegalState { .. }));
        assert!(directory.create_subject("alice").is_err());
    }

    #[test]
    fn system_session_is_distinguished_and_findable() {
        let directory = running();
        let system = directory.system_session().unwrap();
        assert!(system.is_system());
        assert!(system.close("anyone").is_err());

        let found = directory.find_session(system.id()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &system));
        assert_eq!(
            directory.find_subject(system.subject_id()).unwrap().unwrap().name(),
            "system"
        );
    }

    #[test]
    fn unknown_lookups_are_empty_not_errors() {
        let directory = running();
        assert!(directory.find_subject(SubjectId::new()).unwrap().is_none());
        assert!(directory.find_session(SessionId::new()).unwrap().is_none());
        assert!(directory.find_tenant(&TenantId::from("nobody")).unwrap().is_none());
    }

    #[test]
    fn closed_sessions_are_not_found() {
        let directory = running();
        let subject = directory.create_subject("alice").unwrap();
        let session = subject.open_session("test").unwrap();
        assert!(directory.find_session(session.id()).unwrap().is_some());

        session.close("test").unwrap();
        assert!(directory.find_session(session.id()).unwrap().is_none());
    }

    #[test]
    fn execution_binding_clears_and_ignores_closed_sessions() {
        let directory = running();
        let subject = directory.create_subject("alice").unwrap();
        let session = subject.open_session("test").unwrap();

        let mut context = ExecutionContext::labeled("request-1");
        assert!(directory.execution_session(&context).unwrap().is_none());

        directory
            .set_execution_session(&mut context, Some(session.clone()))
            .unwrap();
        assert_eq!(
            directory.execution_session(&context).unwrap().map(|s| s.id()),
            Some(session.id())
        );

        session.close("test").unwrap();
        assert!(directory.execution_session(&context).unwrap().is_none());
        assert!(directory
            .set_execution_session(&mut context, Some(session))
            .is_err());

        directory.set_execution_session(&mut context, None).unwrap();
        assert!(directory.execution_session(&context).unwrap().is_none());
    }

    #[test]
    fn duplicate_tenants_are_tenancy_errors() {
        let directory = running();
        directory.create_tenant(TenantId::from("acme"), "Acme").unwrap();
        let err = directory.create_tenant(TenantId::from("acme"), "Acme").unwrap_err();
        assert_eq!(err.tenant_id(), Some(&TenantId::from("acme")));
    }

    #[test]
    fn shutdown_is_terminal_and_closes_sessions() {
        let directory = running();
        let subject = directory.create_subject("alice").unwrap();
        let session = subject.open_session("test").unwrap();

        directory.shutdown();
        assert!(!session.is_open());
        assert_matches!(
            directory.find_subject(subject.id()),
            Err(WardenError::IllegalState { .. })
        );
        assert!(directory.initialize(&ProviderConfig::new()).is_err());
        directory.shutdown();
    }
}
