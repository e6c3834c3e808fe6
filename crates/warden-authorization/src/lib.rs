//! Warden Authorization - constraint evaluation
//!
//! Protected resource types are described by [`ResourceModel`] registration
//! tables. Installed [`ConstraintProvider`]s inspect a [`ResourceAction`] and
//! contribute [`Constraint`]s; each constraint is bound to an
//! [`Authorization`] that evaluates a session and a resource instance to an
//! [`AuthorizationResult`].
//!
//! ```text
//! caller ──▶ ConstraintEngine::evaluate(action, session, instance)
//!               │ constraints for action (cached, from every provider)
//!               │ authorize each independently
//!               ▼
//!            merge_all: DENIED > AUTHORIZED > ABSTAIN
//! ```

#![forbid(unsafe_code)]

/// Constraint, authorization and session-view traits
pub mod constraint;

/// Lifecycle-guarded evaluation engine
pub mod engine;

/// Resource models and actions
pub mod model;

/// Provider protocol
pub mod provider;

/// Resource type registry
pub mod registry;

/// Three-valued results and merging
pub mod result;

pub use constraint::{Authorization, Constraint, SessionContext};
pub use engine::{ConstraintEngine, RegisteredConstraint};
pub use model::{
    AccessorDescriptor, ActionDescriptor, InvocationError, Marker, ResourceAction, ResourceModel,
    ResourceModelBuilder,
};
pub use provider::{ConstraintProvider, DynConstraintProvider};
pub use registry::ResourceRegistry;
pub use result::AuthorizationResult;
