//! Tenants

use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use warden_core::events::{TenantDisabled, TenantEnabled};
use warden_core::{Event, Listeners, Result, TenantId, WardenError};

/// An isolation boundary owning resources
pub struct Tenant {
    id: TenantId,
    name: String,
    listeners: Arc<Listeners>,
    enabled: Mutex<bool>,
}

impl Tenant {
    /// Create an enabled tenant
    pub fn new(id: TenantId, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            listeners: Arc::new(Listeners::new()),
            enabled: Mutex::new(true),
        })
    }

    /// Tenant identifier
    pub fn id(&self) -> &TenantId {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the tenant accepts new memberships and profile switches
    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    /// Listeners receiving tenant and membership events
    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    /// Enable a disabled tenant
    pub fn enable(&self, enabled_by: &str) -> Result<TenantEnabled> {
        {
            let mut enabled = self.enabled.lock();
            if *enabled {
                return Err(WardenError::tenancy(self.id.clone(), "tenant is already enabled"));
            }
            *enabled = true;
        }

        let event = TenantEnabled {
            tenant_id: self.id.clone(),
            enabled_by: enabled_by.to_string(),
            at: Utc::now(),
        };
        tracing::info!(tenant = %self.id, by = enabled_by, "Tenant enabled");
        self.listeners.emit(&Event::from(event.clone()));
        Ok(event)
    }

    /// Disable an enabled tenant
    pub fn disable(&self, disabled_by: &str, reason: &str) -> Result<TenantDisabled> {
        {
            let mut enabled = self.enabled.lock();
            if !*enabled {
                return Err(WardenError::tenancy(self.id.clone(), "tenant is already disabled"));
            }
            *enabled = false;
        }

        let event = TenantDisabled {
            tenant_id: self.id.clone(),
            disabled_by: disabled_by.to_string(),
            reason: reason.to_string(),
            at: Utc::now(),
        };
        tracing::info!(tenant = %self.id, by = disabled_by, reason, "Tenant disabled");
        self.listeners.emit(&Event::from(event.clone()));
        Ok(event)
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::EventKind;

    #[test]
    fn enable_disable_are_not_idempotent() {
        let tenant = Tenant::new(TenantId::from("acme"), "Acme");
        assert!(tenant.enable("ops").unwrap_err().tenant_id().is_some());

        tenant.disable("ops", "billing").unwrap();
        assert!(!tenant.is_enabled());
        assert!(tenant.disable("ops", "billing").is_err());

        tenant.enable("ops").unwrap();
        assert!(tenant.is_enabled());
    }

    #[test]
    fn transitions_are_announced() {
        let tenant = Tenant::new(TenantId::from("acme"), "Acme");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tenant.listeners().on_kinds(
            &[EventKind::TenantDisabled, EventKind::TenantEnabled],
            move |event| {
                sink.lock().push(event.kind());
                Ok(())
            },
        );

        tenant.disable("ops", "audit").unwrap();
        tenant.enable("ops").unwrap();
        assert_eq!(
            *seen.lock(),
            vec![EventKind::TenantDisabled, EventKind::TenantEnabled]
        );
    }
}
