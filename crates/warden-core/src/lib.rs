//! Warden Core - shared vocabulary of the identity layer
//!
//! Every other Warden crate speaks in the types defined here:
//!
//! - Identifiers for subjects, sessions, tenants, memberships and subscribers
//! - [`WardenError`], the single error type with its identity / tenancy /
//!   authentication / definition / format categories
//! - [`Event`] records and the [`Listeners`] table used to observe state transitions
//! - [`SecurityToken`] and the non-secure [`UnsecureToken`] wire format
//! - [`ProviderConfig`], the flat configuration mapping handed to providers
//!
//! # Crate Architecture
//!
//! ```text
//! warden-core
//!     ↑            ↑
//! warden-authentication   warden-authorization
//!     ↑            ↑                ↑
//!     warden-identity        warden-multitenant
//! ```

#![forbid(unsafe_code)]

/// Assurance levels for authenticated identities
pub mod assurance;

/// Flat provider configuration
pub mod config;

/// Unified error handling
pub mod errors;

/// Immutable state-transition records
pub mod events;

/// Subject, session, tenant and membership identifiers
pub mod identifiers;

/// Per-kind listener tables
pub mod listeners;

/// Attribute tokens and the unsecured wire format
pub mod token;

pub use assurance::AssuranceLevel;
pub use config::ProviderConfig;
pub use errors::{Result, WardenError};
pub use events::{Event, EventKind};
pub use identifiers::{MembershipId, SessionId, SubjectId, SubscriberId, TenantId};
pub use listeners::{ListenerError, ListenerId, Listeners};
pub use token::{SecurityToken, TokenBuilder, UnsecureToken};
