//! Listener tables
//!
//! A [`Listeners`] table maps each [`EventKind`] to the handlers registered for
//! it, in registration order. Emitting a kind with no handlers is a no-op.
//!
//! Dispatch is synchronous and best-effort: the emitting state transition is
//! already committed when handlers run, a failing or panicking handler is
//! logged and skipped, and the remaining handlers still run.

use crate::events::{Event, EventKind};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Failure reported by a listener callback
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ListenerError(#[from] Box<dyn std::error::Error + Send + Sync>);

impl ListenerError {
    /// Create a listener error from a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// Result returned by listener callbacks
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// A registered event callback
pub type Handler = Arc<dyn Fn(&Event) -> ListenerResult + Send + Sync>;

/// Handle used to unregister a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    handler: Handler,
}

/// Ordered handlers per event kind
#[derive(Default)]
pub struct Listeners {
    table: RwLock<BTreeMap<EventKind, Vec<Registration>>>,
}

impl Listeners {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.on_kinds(&[kind], handler)
    }

    /// Register a handler for every event kind
    pub fn on_any<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.on_kinds(&EventKind::ALL, handler)
    }

    /// Register one handler under several event kinds
    pub fn on_kinds<F>(&self, kinds: &[EventKind], handler: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(handler);
        let mut table = self.table.write();
        for kind in kinds {
            table.entry(*kind).or_default().push(Registration {
                id,
                handler: Arc::clone(&handler),
            });
        }
        id
    }

    /// Unregister a handler from every kind it was registered under
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut removed = false;
        let mut table = self.table.write();
        for registrations in table.values_mut() {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            removed |= registrations.len() != before;
        }
        table.retain(|_, registrations| !registrations.is_empty());
        removed
    }

    /// Number of handlers registered for a kind
    pub fn count(&self, kind: EventKind) -> usize {
        self.table.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to its handlers, returning how many of them failed
    ///
    /// The table lock is released before any handler runs, so handlers may
    /// register or remove listeners.
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let registrations = match self.table.read().get(&kind) {
            Some(registrations) => registrations.clone(),
            None => return 0,
        };

        let mut failures = 0;
        for registration in registrations {
            match catch_unwind(AssertUnwindSafe(|| (registration.handler)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    tracing::warn!(
                        listener = registration.id.0,
                        event = ?kind,
                        error = %err,
                        "Listener failed to handle event"
                    );
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(
                        listener = registration.id.0,
                        event = ?kind,
                        "Listener panicked while handling event"
                    );
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.read();
        f.debug_map()
            .entries(table.iter().map(|(kind, regs)| (kind, regs.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CredentialGranted, TenantEnabled};
    use crate::identifiers::{SubjectId, TenantId};
    use chrono::Utc;
    use parking_lot::Mutex;

    fn tenant_enabled() -> Event {
        TenantEnabled {
            tenant_id: TenantId::from("acme"),
            enabled_by: "root".to_string(),
            at: Utc::now(),
        }
        .into()
    }

    #[test]
    fn emit_without_handlers_is_noop() {
        let listeners = Listeners::new();
        assert_eq!(listeners.emit(&tenant_enabled()), 0);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let listeners = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            listeners.on(EventKind::TenantEnabled, move |_| {
                seen.lock().push(n);
                Ok(())
            });
        }

        listeners.emit(&tenant_enabled());
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_listener_does_not_block_siblings() {
        let listeners = Listeners::new();
        let reached = Arc::new(Mutex::new(0));

        listeners.on(EventKind::TenantEnabled, |_| Err(ListenerError::msg("boom")));
        listeners.on(EventKind::TenantEnabled, |_| panic!("listener panic"));
        let counter = Arc::clone(&reached);
        listeners.on(EventKind::TenantEnabled, move |_| {
            *counter.lock() += 1;
            Ok(())
        });

        assert_eq!(listeners.emit(&tenant_enabled()), 2);
        assert_eq!(*reached.lock(), 1);
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let listeners = Listeners::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        listeners.on(EventKind::CredentialGranted, move |_| {
            *counter.lock() += 1;
            Ok(())
        });

        listeners.emit(&tenant_enabled());
        listeners.emit(
            &CredentialGranted {
                subject_id: SubjectId::new(),
                credential: "secret".to_string(),
                at: Utc::now(),
            }
            .into(),
        );
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn remove_unregisters_from_all_kinds() {
        let listeners = Listeners::new();
        let id = listeners.on_any(|_| Ok(()));
        assert_eq!(listeners.count(EventKind::SessionClosed), 1);

        assert!(listeners.remove(id));
        assert_eq!(listeners.count(EventKind::SessionClosed), 0);
        assert!(!listeners.remove(id));
    }
}
