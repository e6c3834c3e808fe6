//! Identity manager selection
//!
//! Implementations are offered as candidates; the first one the caller's
//! predicate accepts is initialized and becomes the process-wide manager.

use crate::directory::IdentityManager;
use parking_lot::RwLock;
use std::sync::Arc;
use warden_core::{ProviderConfig, Result, WardenError};

/// Initialize the first acceptable candidate
///
/// A candidate whose initialization fails is skipped. Fails with
/// [`WardenError::NoImplementationFound`] when nothing is left.
pub fn load_identity_manager<F>(
    candidates: Vec<Box<dyn IdentityManager>>,
    accept: F,
    config: &ProviderConfig,
) -> Result<Arc<dyn IdentityManager>>
where
    F: Fn(&dyn IdentityManager) -> bool,
{
    let offered: Vec<String> = candidates.iter().map(|c| c.name().to_string()).collect();

    for candidate in candidates {
        if !accept(candidate.as_ref()) {
            tracing::debug!(manager = candidate.name(), "Identity manager not accepted");
            continue;
        }
        match candidate.initialize(config) {
            Ok(()) => {
                tracing::info!(manager = candidate.name(), "Identity manager loaded");
                return Ok(Arc::from(candidate));
            }
            Err(err) => {
                tracing::warn!(
                    manager = candidate.name(),
                    error = %err,
                    "Identity manager failed to initialize"
                );
            }
        }
    }

    Err(WardenError::no_implementation(format!(
        "no acceptable identity manager among [{}]",
        offered.join(", ")
    )))
}

/// Holder of the process-wide identity manager
#[derive(Default)]
pub struct ManagerSlot {
    manager: RwLock<Option<Arc<dyn IdentityManager>>>,
}

impl ManagerSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a manager, returning the one it replaces
    pub fn set(&self, manager: Arc<dyn IdentityManager>) -> Option<Arc<dyn IdentityManager>> {
        self.manager.write().replace(manager)
    }

    /// The installed manager
    pub fn get(&self) -> Result<Arc<dyn IdentityManager>> {
        self.manager
            .read()
            .clone()
            .ok_or_else(|| WardenError::no_implementation("no identity manager is installed"))
    }

    /// Remove and shut down the installed manager
    pub fn clear(&self) {
        let previous = self.manager.write().take();
        if let Some(manager) = previous {
            manager.shutdown();
        }
    }
}

impl std::fmt::Debug for ManagerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.manager.read().as_ref().map(|m| m.name().to_string());
        f.debug_struct("ManagerSlot").field("manager", &name).finish()
    }
}
