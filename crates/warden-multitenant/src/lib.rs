//! Warden Multitenant - tenant-ownership authorization
//!
//! A resource type names its owning tenant through exactly one accessor marked
//! [`TENANT`]; actions marked [`TENANT_RESTRICTED`] may then only be invoked by
//! sessions whose current tenancy equals that tenant.
//!
//! ```text
//! ResourceModel::builder::<Document>()
//!     .accessor("tenant", &[TENANT], |d| d.tenant.clone())
//!     .action("delete", &[TENANT_RESTRICTED])
//! ```
//!
//! | instance tenant | session tenancy | result     |
//! |-----------------|-----------------|------------|
//! | `T1`            | `T1`            | AUTHORIZED |
//! | `T1`            | `T2`            | DENIED     |
//! | `T1`            | none            | DENIED     |
//! | accessor fails  | any             | DENIED     |
//! | other type      | any             | ABSTAIN    |

#![forbid(unsafe_code)]

use warden_authorization::Marker;

/// Tenant constraint and authorization
pub mod constraint;

/// Tenant constraint provider
pub mod provider;

/// Marks the accessor yielding a resource instance's owning tenant
pub const TENANT: Marker = Marker::new("tenant");

/// Marks an action as restricted to the owning tenant's sessions
pub const TENANT_RESTRICTED: Marker = Marker::new("tenant_restricted");

pub use constraint::{TenantAuthorization, TenantConstraint};
pub use provider::{TenantConstraintProvider, TENANT_PROVIDER};
