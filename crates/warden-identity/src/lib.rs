//! Warden Identity - subjects, sessions, tenants and the directory
//!
//! ```text
//! IdentityManager (InMemoryDirectory)
//!   ├── system Subject ── system Session (never closes)
//!   ├── Subject ──┬── Credential*            authenticate() opens / elevates
//!   │             ├── Session? ── Subscriber*
//!   │             └── Membership* ──▶ Tenant
//!   │                    └── AuthorizationProfile
//!   └── Tenant*
//! ```
//!
//! A subject has at most one open session. Selecting one of the subject's
//! memberships as the session profile gives the session its tenancy, which is
//! what tenant constraints compare resources against.
//!
//! Every state transition produces an [`Event`](warden_core::Event) delivered to
//! the owning object's listeners after its lock is released. Membership events
//! reach both the subject's and the tenant's listeners.
//!
//! Concurrent units of work each carry an [`ExecutionContext`]; binding a
//! session to one context is invisible to every other.

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod directory;
pub mod discovery;
pub mod membership;
pub mod session;
pub mod subject;
pub mod tenant;

pub use config::DirectoryConfig;
pub use context::ExecutionContext;
pub use directory::{IdentityManager, InMemoryDirectory, IN_MEMORY_DIRECTORY};
pub use discovery::{load_identity_manager, ManagerSlot};
pub use membership::{AuthorizationProfile, Membership, MembershipBuilder};
pub use session::{Session, SessionSubscriber};
pub use subject::Subject;
pub use tenant::Tenant;
