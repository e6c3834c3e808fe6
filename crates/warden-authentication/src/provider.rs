//! Credential provider interface
//!
//! A credential provider adapts implementation-specific credential objects
//! (certificates, hashed passwords, external assertions) into [`Credential`]s.
//! Providers follow the same lifecycle as every other Warden plugin:
//!
//! ```text
//! initialize(config) → as_credential(..)* → shutdown()
//! ```

use crate::credential::Credential;
use std::any::Any;
use warden_core::{ProviderConfig, Result, SubjectId};

/// Adapter from external credential objects to [`Credential`]s
pub trait CredentialProvider: Send + Sync {
    /// The credential kind this provider produces
    type Credential: Credential;

    /// Provider name, used in logs
    fn name(&self) -> &str;

    /// Initialize the provider with its configuration
    fn initialize(&mut self, config: &ProviderConfig) -> Result<()>;

    /// Convert an implementation-specific credential object for a subject
    ///
    /// Fails with an unsupported-credential error naming the object's type
    /// when the provider does not understand it, and with an illegal-state
    /// error when the provider is not initialized.
    fn as_credential<T: Any>(&self, subject_id: SubjectId, credential: &T)
        -> Result<Self::Credential>;

    /// Synchronously shut the provider down
    fn shutdown(&mut self);
}
