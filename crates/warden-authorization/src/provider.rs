//! Constraint provider protocol
//!
//! ```text
//! initialize(config) → { action_constraints(action) | create_authorization(c) }* → shutdown()
//! ```
//!
//! Providers implement the typed [`ConstraintProvider`]. The engine holds them
//! as [`DynConstraintProvider`] trait objects; the blanket impl erases the
//! associated types and rejects constraints issued by another provider.

use crate::constraint::{Authorization, Constraint};
use crate::model::ResourceAction;
use std::sync::Arc;
use warden_core::{ProviderConfig, Result, WardenError};

/// A lifecycle-managed source of constraints and their evaluators
pub trait ConstraintProvider: Send + Sync {
    /// Constraint kind this provider issues
    type Constraint: Constraint;

    /// Evaluator kind bound to [`Self::Constraint`]
    type Authorization: Authorization + 'static;

    /// Provider name; also the configuration scope passed to `initialize`
    fn name(&self) -> &str;

    /// Prepare the provider for use
    fn initialize(&mut self, config: &ProviderConfig) -> Result<()>;

    /// Constraints this provider defines for `action`
    ///
    /// Actions the provider has no opinion about yield an empty list.
    /// Malformed resource declarations yield an invalid-definition error.
    fn action_constraints(&self, action: &ResourceAction) -> Result<Vec<Self::Constraint>>;

    /// Build the evaluator for one of this provider's constraints
    fn create_authorization(&self, constraint: &Self::Constraint) -> Result<Self::Authorization>;

    /// Release resources; the provider is unusable afterwards
    fn shutdown(&mut self);
}

/// Object-safe view of a [`ConstraintProvider`]
pub trait DynConstraintProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Prepare the provider for use
    fn initialize(&mut self, config: &ProviderConfig) -> Result<()>;

    /// Constraints this provider defines for `action`
    fn action_constraints(&self, action: &ResourceAction) -> Result<Vec<Arc<dyn Constraint>>>;

    /// Build the evaluator for a constraint; foreign constraints are rejected
    fn create_authorization(&self, constraint: &dyn Constraint) -> Result<Arc<dyn Authorization>>;

    /// Release resources
    fn shutdown(&mut self);
}

impl<P: ConstraintProvider> DynConstraintProvider for P {
    fn name(&self) -> &str {
        ConstraintProvider::name(self)
    }

    fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        ConstraintProvider::initialize(self, config)
    }

    fn action_constraints(&self, action: &ResourceAction) -> Result<Vec<Arc<dyn Constraint>>> {
        Ok(ConstraintProvider::action_constraints(self, action)?
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn Constraint>)
            .collect())
    }

    fn create_authorization(&self, constraint: &dyn Constraint) -> Result<Arc<dyn Authorization>> {
        let Some(own) = constraint.as_any().downcast_ref::<P::Constraint>() else {
            return Err(WardenError::unsupported_format(format!(
                "provider '{}' did not issue constraint '{}'",
                ConstraintProvider::name(self),
                constraint.identity()
            )));
        };
        let authorization = ConstraintProvider::create_authorization(self, own)?;
        Ok(Arc::new(authorization))
    }

    fn shutdown(&mut self) {
        ConstraintProvider::shutdown(self)
    }
}
