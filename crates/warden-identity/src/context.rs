//! Execution contexts
//!
//! Each logical unit of work (request, task, thread) carries its own
//! [`ExecutionContext`]. The session bound to it travels with the value, so two
//! concurrent contexts never observe each other's binding.

use crate::session::Session;
use std::sync::Arc;

/// The execution-session slot of one logical unit of work
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    label: Option<String>,
    session: Option<Arc<Session>>,
}

impl ExecutionContext {
    /// Create an unbound context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unbound context with a label used in logs
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            session: None,
        }
    }

    /// Label of the context, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Bound session, whether or not it is still open
    pub(crate) fn bound(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub(crate) fn bind(&mut self, session: Option<Arc<Session>>) {
        self.session = session;
    }
}
