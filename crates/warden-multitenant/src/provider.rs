//! Tenant constraint provider

use crate::constraint::{TenantAuthorization, TenantConstraint};
use warden_authorization::{ConstraintProvider, ResourceAction};
use warden_core::{ProviderConfig, Result, WardenError};

/// Provider name and configuration scope
pub const TENANT_PROVIDER: &str = "tenant";

/// Issues [`TenantConstraint`]s for tenant-restricted actions
#[derive(Debug, Default)]
pub struct TenantConstraintProvider {
    initialized: bool,
}

impl TenantConstraintProvider {
    /// Create an uninitialized provider
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(WardenError::illegal_state(
                "tenant constraint provider is not initialized",
            ))
        }
    }
}

impl ConstraintProvider for TenantConstraintProvider {
    type Constraint = TenantConstraint;
    type Authorization = TenantAuthorization;

    fn name(&self) -> &str {
        TENANT_PROVIDER
    }

    fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        self.initialized = true;
        tracing::debug!(
            provider = TENANT_PROVIDER,
            keys = config.len(),
            "Constraint provider initialized"
        );
        Ok(())
    }

    fn action_constraints(&self, action: &ResourceAction) -> Result<Vec<TenantConstraint>> {
        self.ensure_initialized()?;
        Ok(TenantConstraint::for_action(action)?.into_iter().collect())
    }

    fn create_authorization(&self, constraint: &TenantConstraint) -> Result<TenantAuthorization> {
        self.ensure_initialized()?;
        Ok(TenantAuthorization::new(constraint.clone()))
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        tracing::debug!(provider = TENANT_PROVIDER, "Constraint provider shut down");
    }
}
