//! Shared-secret credentials
//!
//! The secret is compared in constant time. The public string form only
//! carries the credential's key id, so it is safe to place in events.

use crate::candidate::Candidate;
use crate::credential::Credential;
use crate::provider::CredentialProvider;
use std::any::{type_name, Any};
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use warden_core::events::SubjectAuthenticated;
use warden_core::{AssuranceLevel, ProviderConfig, Result, SubjectId, WardenError};

/// Credential type recorded on authentication events
pub const SHARED_SECRET: &str = "shared-secret";

/// A password or API key held by one subject
pub struct SharedSecretCredential {
    key_id: Uuid,
    subject_id: SubjectId,
    secret: Vec<u8>,
    assurance_level: AssuranceLevel,
    authenticated: bool,
}

impl SharedSecretCredential {
    /// Create a credential for a subject
    pub fn new(
        subject_id: SubjectId,
        secret: impl AsRef<[u8]>,
        assurance_level: AssuranceLevel,
    ) -> Self {
        Self {
            key_id: Uuid::new_v4(),
            subject_id,
            secret: secret.as_ref().to_vec(),
            assurance_level,
            authenticated: false,
        }
    }

    /// Identifier of this secret, distinct for every credential
    pub fn key_id(&self) -> Uuid {
        self.key_id
    }

    fn matches(&self, presented: &[u8]) -> bool {
        self.secret.ct_eq(presented).into()
    }
}

impl Credential for SharedSecretCredential {
    fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    fn credential_type(&self) -> &str {
        SHARED_SECRET
    }

    fn assurance_level(&self) -> AssuranceLevel {
        self.assurance_level
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn authenticate(&mut self, candidate: &Candidate) -> Result<SubjectAuthenticated> {
        let Candidate::Secret(presented) = candidate else {
            return Err(WardenError::authentication(
                Some(self.subject_id),
                format!(
                    "{SHARED_SECRET} credential cannot verify a {} candidate",
                    candidate.kind()
                ),
            ));
        };

        if !self.matches(presented.as_bytes()) {
            return Err(WardenError::authentication(
                Some(self.subject_id),
                "shared secret does not match",
            ));
        }

        self.authenticated = true;
        Ok(SubjectAuthenticated::now(
            self.subject_id,
            SHARED_SECRET,
            self.assurance_level,
        ))
    }

    fn as_string(&self) -> String {
        format!("{SHARED_SECRET}:{}", self.key_id)
    }
}

impl fmt::Debug for SharedSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecretCredential")
            .field("key_id", &self.key_id)
            .field("subject_id", &self.subject_id)
            .field("assurance_level", &self.assurance_level)
            .field("authenticated", &self.authenticated)
            .finish_non_exhaustive()
    }
}

/// Adapts strings and byte vectors into [`SharedSecretCredential`]s
///
/// Recognized configuration keys:
///
/// - `assurance_level` (default `1`): level granted to produced credentials
/// - `min_length` (default `8`): shortest accepted secret, in bytes
#[derive(Debug, Default)]
pub struct SharedSecretProvider {
    settings: Option<Settings>,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    assurance_level: AssuranceLevel,
    min_length: usize,
}

impl SharedSecretProvider {
    /// Create an uninitialized provider
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self) -> Result<Settings> {
        self.settings.ok_or_else(|| {
            WardenError::illegal_state("shared secret provider is not initialized")
        })
    }
}

impl CredentialProvider for SharedSecretProvider {
    type Credential = SharedSecretCredential;

    fn name(&self) -> &str {
        SHARED_SECRET
    }

    fn initialize(&mut self, config: &ProviderConfig) -> Result<()> {
        let settings = Settings {
            assurance_level: config
                .parse::<u8>("assurance_level")?
                .map_or(AssuranceLevel::LEVEL_1, AssuranceLevel::new),
            min_length: config.parse::<usize>("min_length")?.unwrap_or(8),
        };
        tracing::debug!(
            provider = SHARED_SECRET,
            assurance = %settings.assurance_level,
            min_length = settings.min_length,
            "Credential provider initialized"
        );
        self.settings = Some(settings);
        Ok(())
    }

    fn as_credential<T: Any>(
        &self,
        subject_id: SubjectId,
        credential: &T,
    ) -> Result<SharedSecretCredential> {
        let settings = self.settings()?;
        let any = credential as &dyn Any;
        let secret: &[u8] = if let Some(s) = any.downcast_ref::<String>() {
            s.as_bytes()
        } else if let Some(s) = any.downcast_ref::<&str>() {
            s.as_bytes()
        } else if let Some(bytes) = any.downcast_ref::<Vec<u8>>() {
            bytes
        } else {
            return Err(WardenError::unsupported_credential(
                type_name::<T>(),
                "shared secret provider accepts strings and byte vectors",
            ));
        };

        if secret.len() < settings.min_length {
            return Err(WardenError::unsupported_credential(
                type_name::<T>(),
                format!("secret is shorter than {} bytes", settings.min_length),
            ));
        }

        Ok(SharedSecretCredential::new(
            subject_id,
            secret,
            settings.assurance_level,
        ))
    }

    fn shutdown(&mut self) {
        self.settings = None;
        tracing::debug!(provider = SHARED_SECRET, "Credential provider shut down");
    }
}
