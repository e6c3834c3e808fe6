//! The credential abstraction.

use crate::candidate::Candidate;
use std::fmt;
use warden_core::events::SubjectAuthenticated;
use warden_core::{AssuranceLevel, Result, SubjectId};

/// A single-factor authentication assertion bound to one subject
///
/// Two credentials are the same credential when their [`as_string`](Self::as_string)
/// forms are equal; subjects use that form to keep their credential set
/// free of duplicates.
pub trait Credential: Send + Sync + fmt::Debug {
    /// The subject this credential belongs to
    fn subject_id(&self) -> SubjectId;

    /// Name of the credential kind, recorded on authentication events
    fn credential_type(&self) -> &str;

    /// Assurance a successful authentication with this credential provides
    fn assurance_level(&self) -> AssuranceLevel;

    /// Whether this credential has authenticated successfully
    fn is_authenticated(&self) -> bool;

    /// Authenticate a candidate value against this credential
    ///
    /// Returns the authentication event on success and an authentication
    /// error on failure, including when the candidate is of a kind this
    /// credential does not understand.
    fn authenticate(&mut self, candidate: &Candidate) -> Result<SubjectAuthenticated>;

    /// Public string form of the credential; never contains secret material
    fn as_string(&self) -> String;
}
