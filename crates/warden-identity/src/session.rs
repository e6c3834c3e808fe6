//! Sessions and their subscribers
//!
//! A [`Session`] binds a subject to an optional membership profile (and so to
//! a tenancy) for a sequence of actions. Its assurance level only ever rises.
//!
//! Parties interested in a session (a UI connection, a worker) attach as
//! subscribers through [`Session::subscribe`] and keep their subscription
//! alive with heartbeats. Idle subscribers are unbound by whoever keeps time,
//! via [`Session::expire_idle`]. Closing the session notifies every
//! subscriber's close handler.
//!
//! ```text
//! open ──change_profile / clear_profile / put_property / subscribe──▶ open
//!   └──close()──▶ closed (terminal; the system session refuses)
//! ```

use crate::membership::Membership;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use warden_authorization::SessionContext;
use warden_core::events::{
    SessionClosed, SessionOpened, SessionProfileChanged, SessionProfileCleared,
    SessionPropertyChanged, SessionUnbound, SubscriberHeartbeat,
};
use warden_core::{
    AssuranceLevel, Event, Listeners, MembershipId, Result, SessionId, SubjectId, SubscriberId,
    TenantId, WardenError,
};

type CloseHandler = Arc<dyn Fn(&SessionClosed) + Send + Sync>;

/// Timestamps shared by a subscriber's entry and its handles
#[derive(Debug, Clone, Copy)]
struct Activity {
    last: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

/// A bound subscriber; unbinding removes the entry
struct Subscriber {
    activity: Arc<Mutex<Activity>>,
    nonces: HashSet<String>,
    close_handler: Option<CloseHandler>,
}

impl Subscriber {
    fn last_activity(&self) -> DateTime<Utc> {
        self.activity.lock().last
    }

    fn unbind(self, at: DateTime<Utc>) -> Option<CloseHandler> {
        self.activity.lock().closed_at = Some(at);
        self.close_handler
    }
}

struct SessionState {
    open: bool,
    closed_at: Option<DateTime<Utc>>,
    profile: Option<Arc<Membership>>,
    properties: BTreeMap<String, String>,
    assurance: AssuranceLevel,
    subscribers: IndexMap<SubscriberId, Subscriber>,
}

/// A subject's runtime security context
pub struct Session {
    id: SessionId,
    subject_id: SubjectId,
    system: bool,
    created_by: String,
    opened_at: DateTime<Utc>,
    listeners: Arc<Listeners>,
    state: Mutex<SessionState>,
}

/// A closed session whose event has not been delivered yet
pub(crate) struct ClosedNotice {
    event: SessionClosed,
    handlers: Vec<CloseHandler>,
    listeners: Arc<Listeners>,
}

impl ClosedNotice {
    /// Emit the close event, then run subscriber close handlers
    pub(crate) fn deliver(self) -> SessionClosed {
        self.listeners.emit(&Event::from(self.event.clone()));
        for handler in self.handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&self.event))).is_err() {
                tracing::warn!(session = %self.event.session_id, "Session close handler panicked");
            }
        }
        self.event
    }
}

impl Session {
    pub(crate) fn open(
        subject_id: SubjectId,
        created_by: &str,
        assurance: AssuranceLevel,
        listeners: Arc<Listeners>,
    ) -> (Arc<Self>, SessionOpened) {
        let session = Arc::new(Self::with_state(subject_id, created_by, false, assurance, listeners));
        let event = SessionOpened {
            subject_id,
            session_id: session.id,
            created_by: created_by.to_string(),
            at: session.opened_at,
        };
        (session, event)
    }

    pub(crate) fn system(subject_id: SubjectId, name: &str, listeners: Arc<Listeners>) -> Arc<Self> {
        Arc::new(Self::with_state(
            subject_id,
            name,
            true,
            AssuranceLevel::LEVEL_4,
            listeners,
        ))
    }

    fn with_state(
        subject_id: SubjectId,
        created_by: &str,
        system: bool,
        assurance: AssuranceLevel,
        listeners: Arc<Listeners>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            subject_id,
            system,
            created_by: created_by.to_string(),
            opened_at: Utc::now(),
            listeners,
            state: Mutex::new(SessionState {
                open: true,
                closed_at: None,
                profile: None,
                properties: BTreeMap::new(),
                assurance,
                subscribers: IndexMap::new(),
            }),
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Subject the session belongs to
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    /// Whether this is the process's own session
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Actor that opened the session
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// When the session was opened
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whether the session is still open
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// When the session was closed
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().closed_at
    }

    /// Highest assurance achieved during the session
    pub fn assurance_level(&self) -> AssuranceLevel {
        self.state.lock().assurance
    }

    /// Current membership profile
    pub fn profile(&self) -> Option<Arc<Membership>> {
        self.state.lock().profile.clone()
    }

    /// Tenant of the current profile
    pub fn tenancy(&self) -> Option<TenantId> {
        self.state.lock().profile.as_ref().map(|m| m.tenant().id().clone())
    }

    /// Raise the assurance level; returns the new level if it increased
    pub(crate) fn elevate(&self, level: AssuranceLevel) -> Option<AssuranceLevel> {
        let mut state = self.state.lock();
        if level > state.assurance {
            state.assurance = level;
            Some(level)
        } else {
            None
        }
    }

    /// Select a membership of the session's subject as the current profile
    ///
    /// The membership and its tenant must be enabled.
    pub fn change_profile(&self, membership: &Arc<Membership>) -> Result<SessionProfileChanged> {
        if membership.subject_id() != self.subject_id {
            return Err(WardenError::identity(format!(
                "membership '{}' does not belong to subject '{}'",
                membership.nickname(),
                self.subject_id
            )));
        }
        let tenant = membership.tenant();
        // lock order: membership, then session
        membership.while_enabled(|| {
            if !tenant.is_enabled() {
                return Err(WardenError::tenancy(tenant.id().clone(), "tenant is disabled"));
            }
            let mut state = self.state.lock();
            self.ensure_open(&state)?;
            state.profile = Some(Arc::clone(membership));
            Ok(())
        })?;
        membership.note_used();

        let event = SessionProfileChanged {
            subject_id: self.subject_id,
            session_id: self.id,
            membership_id: membership.id(),
            tenant_id: tenant.id().clone(),
            at: Utc::now(),
        };
        tracing::debug!(
            session = %self.id,
            tenant = %tenant.id(),
            membership = membership.nickname(),
            "Session profile changed"
        );
        self.listeners.emit(&Event::from(event.clone()));
        Ok(event)
    }

    /// Drop the current profile, leaving the session without tenancy
    pub fn clear_profile(&self) -> Option<SessionProfileCleared> {
        let cleared = self.state.lock().profile.take().is_some();
        cleared.then(|| self.announce_cleared())
    }

    /// Drop the profile only if it is `membership_id`
    pub(crate) fn detach_profile(&self, membership_id: MembershipId) -> Option<SessionProfileCleared> {
        let detached = {
            let mut state = self.state.lock();
            match &state.profile {
                Some(current) if current.id() == membership_id => {
                    state.profile = None;
                    true
                }
                _ => false,
            }
        };
        detached.then(|| self.announce_cleared())
    }

    fn announce_cleared(&self) -> SessionProfileCleared {
        let event = SessionProfileCleared {
            subject_id: self.subject_id,
            session_id: self.id,
            at: Utc::now(),
        };
        tracing::debug!(session = %self.id, "Session profile cleared");
        self.listeners.emit(&Event::from(event.clone()));
        event
    }

    /// Value of a session property
    pub fn property(&self, name: &str) -> Option<String> {
        self.state.lock().properties.get(name).cloned()
    }

    /// Snapshot of all session properties
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.state.lock().properties.clone()
    }

    /// Set a property, returning the previous value
    pub fn put_property(&self, name: &str, value: &str) -> Result<Option<String>> {
        let previous = {
            let mut state = self.state.lock();
            self.ensure_open(&state)?;
            state.properties.insert(name.to_string(), value.to_string())
        };
        self.listeners.emit(&Event::from(SessionPropertyChanged {
            subject_id: self.subject_id,
            session_id: self.id,
            name: name.to_string(),
            value: value.to_string(),
            at: Utc::now(),
        }));
        Ok(previous)
    }

    /// Attach a subscriber acting for `subject_id`
    pub fn subscribe(self: &Arc<Self>, subject_id: SubjectId) -> Result<SessionSubscriber> {
        let id = SubscriberId::new();
        let now = Utc::now();
        let activity = Arc::new(Mutex::new(Activity {
            last: now,
            closed_at: None,
        }));
        {
            let mut state = self.state.lock();
            self.ensure_open(&state)?;
            state.subscribers.insert(
                id,
                Subscriber {
                    activity: Arc::clone(&activity),
                    nonces: HashSet::new(),
                    close_handler: None,
                },
            );
        }
        tracing::debug!(session = %self.id, subscriber = %id, "Subscriber attached");
        Ok(SessionSubscriber {
            id,
            subject_id,
            created_at: now,
            activity,
            session: Arc::clone(self),
        })
    }

    /// Identifiers of subscribers that have not been unbound
    pub fn active_subscribers(&self) -> Vec<SubscriberId> {
        self.state.lock().subscribers.keys().copied().collect()
    }

    /// Record activity of a subscriber
    pub fn heartbeat(&self, subscriber: SubscriberId) -> Result<SubscriberHeartbeat> {
        let now = Utc::now();
        {
            let mut state = self.state.lock();
            self.ensure_open(&state)?;
            active_subscriber(&mut state, subscriber)?.activity.lock().last = now;
        }
        let event = SubscriberHeartbeat {
            subscriber_id: subscriber,
            session_id: self.id,
            at: now,
        };
        self.listeners.emit(&Event::from(event.clone()));
        Ok(event)
    }

    /// Detach a subscriber
    pub fn unsubscribe(&self, subscriber: SubscriberId) -> Result<SessionUnbound> {
        let now = Utc::now();
        let entry = self
            .state
            .lock()
            .subscribers
            .shift_remove(&subscriber)
            .ok_or_else(|| unbound(subscriber))?;
        entry.unbind(now);
        Ok(self.announce_unbound(subscriber, now))
    }

    /// Unbind every subscriber idle for at least `timeout` as of `now`
    pub fn expire_idle(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<SessionUnbound> {
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        let expired: Vec<SubscriberId> = {
            let mut state = self.state.lock();
            let idle: Vec<SubscriberId> = state
                .subscribers
                .iter()
                .filter(|(_, s)| now - s.last_activity() >= timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in &idle {
                if let Some(entry) = state.subscribers.shift_remove(id) {
                    entry.unbind(now);
                }
            }
            idle
        };
        expired
            .into_iter()
            .map(|id| {
                tracing::debug!(session = %self.id, subscriber = %id, "Idle subscriber unbound");
                self.announce_unbound(id, now)
            })
            .collect()
    }

    fn announce_unbound(&self, subscriber: SubscriberId, at: DateTime<Utc>) -> SessionUnbound {
        let event = SessionUnbound {
            subject_id: self.subject_id,
            session_id: self.id,
            subscriber_id: subscriber,
            at,
        };
        self.listeners.emit(&Event::from(event.clone()));
        event
    }

    /// Issue a one-time nonce to a subscriber
    pub fn generate_nonce(&self, subscriber: SubscriberId) -> Result<String> {
        let nonce = hex::encode(rand::random::<[u8; 16]>());
        let mut state = self.state.lock();
        self.ensure_open(&state)?;
        active_subscriber(&mut state, subscriber)?
            .nonces
            .insert(nonce.clone());
        Ok(nonce)
    }

    /// Spend a nonce previously issued to the subscriber
    pub fn consume_nonce(&self, subscriber: SubscriberId, nonce: &str) -> bool {
        let mut state = self.state.lock();
        state
            .subscribers
            .get_mut(&subscriber)
            .is_some_and(|s| s.nonces.remove(nonce))
    }

    /// Register the callback run when the session closes
    pub fn set_close_handler<F>(&self, subscriber: SubscriberId, handler: F) -> Result<()>
    where
        F: Fn(&SessionClosed) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        active_subscriber(&mut state, subscriber)?.close_handler = Some(Arc::new(handler));
        Ok(())
    }

    /// Close the session
    ///
    /// The system session cannot be closed, and closing twice fails.
    pub fn close(&self, closed_by: &str) -> Result<SessionClosed> {
        if self.system {
            return Err(WardenError::illegal_state("the system session cannot be closed"));
        }
        let notice = self
            .shut(closed_by)
            .ok_or_else(|| WardenError::illegal_state(format!("session '{}' is already closed", self.id)))?;
        Ok(notice.deliver())
    }

    /// Mark the session closed without delivering the event yet
    pub(crate) fn shut(&self, closed_by: &str) -> Option<ClosedNotice> {
        let now = Utc::now();
        let handlers = {
            let mut state = self.state.lock();
            if !state.open {
                return None;
            }
            state.open = false;
            state.closed_at = Some(now);
            state
                .subscribers
                .drain(..)
                .filter_map(|(_, s)| s.unbind(now))
                .collect()
        };
        tracing::info!(session = %self.id, subject = %self.subject_id, by = closed_by, "Session closed");
        Some(ClosedNotice {
            event: SessionClosed {
                subject_id: self.subject_id,
                session_id: self.id,
                closed_by: closed_by.to_string(),
                at: now,
            },
            handlers,
            listeners: Arc::clone(&self.listeners),
        })
    }

    fn ensure_open(&self, state: &SessionState) -> Result<()> {
        if state.open {
            Ok(())
        } else {
            Err(WardenError::illegal_state(format!("session '{}' is closed", self.id)))
        }
    }
}

fn active_subscriber(state: &mut SessionState, id: SubscriberId) -> Result<&mut Subscriber> {
    state.subscribers.get_mut(&id).ok_or_else(|| unbound(id))
}

fn unbound(id: SubscriberId) -> WardenError {
    WardenError::illegal_state(format!("subscriber '{id}' is not bound"))
}

impl SessionContext for Session {
    fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    fn session_id(&self) -> SessionId {
        self.id
    }

    fn tenancy(&self) -> Option<TenantId> {
        Session::tenancy(self)
    }

    fn assurance_level(&self) -> AssuranceLevel {
        Session::assurance_level(self)
    }

    fn is_system(&self) -> bool {
        self.system
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("subject_id", &self.subject_id)
            .field("system", &self.system)
            .field("open", &state.open)
            .field("assurance", &state.assurance)
            .field("profile", &state.profile.as_ref().map(|m| m.id()))
            .field("subscribers", &state.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// A subscriber's handle on a session
#[derive(Clone)]
pub struct SessionSubscriber {
    id: SubscriberId,
    subject_id: SubjectId,
    created_at: DateTime<Utc>,
    activity: Arc<Mutex<Activity>>,
    session: Arc<Session>,
}

impl SessionSubscriber {
    /// Subscriber identifier
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Subject acting through this subscription
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    /// The session subscribed to
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// When the subscription was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last heartbeat, or creation time without one
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity.lock().last
    }

    /// When the subscription ended
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.activity.lock().closed_at
    }

    /// Whether the subscription and its session are both live
    pub fn is_active(&self) -> bool {
        let state = self.session.state.lock();
        state.open && state.subscribers.contains_key(&self.id)
    }

    /// Keep the subscription from timing out
    pub fn heartbeat(&self) -> Result<SubscriberHeartbeat> {
        self.session.heartbeat(self.id)
    }

    /// Set a session property, returning the previous value
    pub fn put_property(&self, name: &str, value: &str) -> Result<Option<String>> {
        self.session.put_property(name, value)
    }

    /// Issue a one-time nonce to this subscriber
    pub fn generate_nonce(&self) -> Result<String> {
        self.session.generate_nonce(self.id)
    }

    /// Spend a nonce issued to this subscriber
    pub fn consume_nonce(&self, nonce: &str) -> bool {
        self.session.consume_nonce(self.id, nonce)
    }

    /// Run `handler` when the session closes
    pub fn set_close_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&SessionClosed) + Send + Sync + 'static,
    {
        self.session.set_close_handler(self.id, handler)
    }

    /// End the subscription
    pub fn close(&self) -> Result<SessionUnbound> {
        self.session.unsubscribe(self.id)
    }
}

impl fmt::Debug for SessionSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSubscriber")
            .field("id", &self.id)
            .field("subject_id", &self.subject_id)
            .field("session", &self.session.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::EventKind;

    fn open_session() -> (Arc<Session>, Arc<Listeners>) {
        let listeners = Arc::new(Listeners::new());
        let (session, _) = Session::open(
            SubjectId::new(),
            "test",
            AssuranceLevel::LEVEL_1,
            listeners.clone(),
        );
        (session, listeners)
    }

    #[test]
    fn assurance_never_decreases() {
        let (session, _) = open_session();
        assert_eq!(session.elevate(AssuranceLevel::LEVEL_3), Some(AssuranceLevel::LEVEL_3));
        assert_eq!(session.elevate(AssuranceLevel::LEVEL_2), None);
        assert_eq!(session.assurance_level(), AssuranceLevel::LEVEL_3);
    }

    #[test]
    fn put_property_returns_previous_value() {
        let (session, listeners) = open_session();
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        listeners.on(EventKind::SessionPropertyChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(session.put_property("locale", "en").unwrap(), None);
        assert_eq!(session.put_property("locale", "fr").unwrap(), Some("en".to_string()));
        assert_eq!(session.property("locale").as_deref(), Some("fr"));
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_is_terminal() {
        let (session, _) = open_session();
        session.close("user").unwrap();
        assert!(!session.is_open());
        assert!(session.closed_at().is_some());
        assert_matches!(session.close("user"), Err(WardenError::IllegalState { .. }));
        assert!(session.put_property("k", "v").is_err());
    }

    #[test]
    fn system_session_refuses_to_close() {
        let session = Session::system(SubjectId::new(), "system", Arc::new(Listeners::new()));
        assert!(session.close("user").is_err());
        assert!(session.is_open());
    }

    #[test]
    fn subscriber_lifecycle() {
        let (session, _) = open_session();
        let subscriber = session.subscribe(SubjectId::new()).unwrap();
        assert!(subscriber.is_active());
        subscriber.heartbeat().unwrap();

        let nonce = subscriber.generate_nonce().unwrap();
        assert_eq!(nonce.len(), 32);
        assert!(subscriber.consume_nonce(&nonce));
        assert!(!subscriber.consume_nonce(&nonce));

        let unbound = subscriber.close().unwrap();
        assert_eq!(unbound.subscriber_id, subscriber.id());
        assert!(!subscriber.is_active());
        assert_eq!(subscriber.closed_at(), Some(unbound.at));
        assert!(subscriber.heartbeat().is_err());
        assert!(subscriber.close().is_err());
        assert!(session.active_subscribers().is_empty());
    }

    #[test]
    fn unbound_subscribers_are_forgotten() {
        let session = Session::system(SubjectId::new(), "system", Arc::new(Listeners::new()));
        for _ in 0..1000 {
            let subscriber = session.subscribe(SubjectId::new()).unwrap();
            subscriber.generate_nonce().unwrap();
            subscriber.close().unwrap();
        }
        assert!(session.state.lock().subscribers.is_empty());

        let idle = session.subscribe(SubjectId::new()).unwrap();
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(session.expire_idle(later, Duration::from_secs(60)).len(), 1);
        assert_eq!(idle.closed_at(), Some(later));
        assert!(session.state.lock().subscribers.is_empty());
    }

    #[test]
    fn idle_subscribers_expire() {
        let (session, _) = open_session();
        let idle = session.subscribe(SubjectId::new()).unwrap();
        let busy = session.subscribe(SubjectId::new()).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(120);
        // only `busy` keeps reporting, from the perspective of the future clock
        busy.activity.lock().last = later;

        let unbound = session.expire_idle(later, Duration::from_secs(60));
        assert_eq!(unbound.len(), 1);
        assert_eq!(unbound[0].subscriber_id, idle.id());
        assert!(busy.is_active());
        assert!(!idle.is_active());
    }

    #[test]
    fn close_handlers_run_after_close() {
        let (session, _) = open_session();
        let subscriber = session.subscribe(SubjectId::new()).unwrap();
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let watched = session.clone();
        subscriber
            .set_close_handler(move |event| {
                *sink.lock() = Some((event.session_id, watched.is_open()));
            })
            .unwrap();

        session.close("admin").unwrap();
        assert_eq!(*observed.lock(), Some((session.id(), false)));
        assert!(subscriber.closed_at().is_some());
        assert!(session.state.lock().subscribers.is_empty());
    }
}
