//! Tenant-ownership constraint and its authorization

use crate::{TENANT, TENANT_RESTRICTED};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use warden_authorization::{
    Authorization, AuthorizationResult, Constraint, ResourceAction, ResourceModel, SessionContext,
};
use warden_core::{Result, WardenError};

/// "The instance must belong to the session's tenant"
///
/// Bound to exactly one parameterless accessor of the resource type, the one
/// marked [`TENANT`].
#[derive(Debug, Clone)]
pub struct TenantConstraint {
    model: Arc<ResourceModel>,
    accessor: String,
}

impl TenantConstraint {
    /// Build the constraint for a tenant-restricted action
    ///
    /// Returns `Ok(None)` for actions not marked [`TENANT_RESTRICTED`]. Fails
    /// with an invalid-definition error when the resource type has no
    /// [`TENANT`] accessor, more than one, or one that takes parameters.
    pub fn for_action(action: &ResourceAction) -> Result<Option<Self>> {
        if !action.is_marked(TENANT_RESTRICTED) {
            return Ok(None);
        }

        let model = action.model();
        let marked: Vec<_> = model.accessors_marked(TENANT).collect();
        let accessor = match marked.as_slice() {
            [] => {
                return Err(WardenError::invalid_definition(
                    model.type_name(),
                    format!("action '{action}' is tenant-restricted but no accessor is marked {TENANT}"),
                ))
            }
            [accessor] => *accessor,
            _ => {
                return Err(WardenError::invalid_definition(
                    model.type_name(),
                    format!(
                        "{} accessors are marked {TENANT} ({}), only one is allowed",
                        marked.len(),
                        marked.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
                    ),
                ))
            }
        };

        if accessor.arity() > 0 {
            return Err(WardenError::invalid_definition(
                model.type_name(),
                format!(
                    "tenant accessor '{}' must not take parameters, it takes {}",
                    accessor.name(),
                    accessor.arity()
                ),
            ));
        }

        Ok(Some(Self {
            model: model.clone(),
            accessor: accessor.name().to_string(),
        }))
    }

    /// Display name of the constrained resource type
    pub fn resource_type(&self) -> &str {
        self.model.type_name()
    }

    /// Name of the tenant accessor
    pub fn accessor(&self) -> &str {
        &self.accessor
    }

    pub(crate) fn model(&self) -> &Arc<ResourceModel> {
        &self.model
    }
}

impl PartialEq for TenantConstraint {
    fn eq(&self, other: &Self) -> bool {
        ResourceModel::type_id(&self.model) == ResourceModel::type_id(&other.model)
            && self.accessor == other.accessor
    }
}

impl Eq for TenantConstraint {}

impl fmt::Display for TenantConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant:{}#{}", self.model.type_name(), self.accessor)
    }
}

impl Constraint for TenantConstraint {
    fn identity(&self) -> String {
        self.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Compares the instance's owning tenant with the session's tenancy
#[derive(Debug, Clone)]
pub struct TenantAuthorization {
    constraint: TenantConstraint,
}

impl TenantAuthorization {
    pub(crate) fn new(constraint: TenantConstraint) -> Self {
        Self { constraint }
    }

    /// The constraint this authorization evaluates
    pub fn constraint(&self) -> &TenantConstraint {
        &self.constraint
    }
}

impl Authorization for TenantAuthorization {
    fn authorize(&self, session: &dyn SessionContext, instance: &dyn Any) -> AuthorizationResult {
        let model = self.constraint.model();
        if !model.accepts(instance) {
            // belongs to another resource type, no opinion
            return AuthorizationResult::Abstain;
        }

        let Some(accessor) = model.accessor(&self.constraint.accessor) else {
            tracing::error!(
                constraint = %self.constraint,
                "Tenant accessor is no longer declared, denying"
            );
            return AuthorizationResult::Denied;
        };

        let owner = match accessor.invoke(instance, &[]) {
            Ok(owner) => owner,
            Err(err) => {
                tracing::error!(
                    constraint = %self.constraint,
                    session = %session.session_id(),
                    error = %err,
                    "Tenant accessor failed, denying"
                );
                return AuthorizationResult::Denied;
            }
        };

        match session.tenancy() {
            Some(tenancy) if tenancy.as_str() == owner => AuthorizationResult::Authorized,
            Some(tenancy) => {
                tracing::debug!(
                    constraint = %self.constraint,
                    session = %session.session_id(),
                    tenant = %tenancy,
                    owner = %owner,
                    "Instance belongs to another tenant"
                );
                AuthorizationResult::Denied
            }
            None => {
                tracing::debug!(
                    constraint = %self.constraint,
                    session = %session.session_id(),
                    "Session has no tenancy"
                );
                AuthorizationResult::Denied
            }
        }
    }

    fn as_string(&self) -> String {
        self.constraint.to_string()
    }
}
