//! Warden Authentication
//!
//! Single-factor credentials and the adapter interface that turns external
//! credential objects into them.
//!
//! A [`Credential`] is bound to exactly one subject and carries an
//! [`AssuranceLevel`](warden_core::AssuranceLevel). Authenticating it against a
//! [`Candidate`] either yields a
//! [`SubjectAuthenticated`](warden_core::events::SubjectAuthenticated) event or
//! fails with an authentication error; it never silently reports `false`.
//!
//! Credential verification primitives are pluggable. [`SharedSecretCredential`]
//! is the one built-in kind, useful for services and tests.

#![forbid(unsafe_code)]

pub mod candidate;
pub mod credential;
pub mod provider;
pub mod shared_secret;

pub use candidate::Candidate;
pub use credential::Credential;
pub use provider::CredentialProvider;
pub use shared_secret::{SharedSecretCredential, SharedSecretProvider};
