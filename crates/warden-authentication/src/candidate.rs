//! Values presented for authentication.

use std::any::Any;
use std::fmt;
use warden_core::SecurityToken;

/// A value a subject presents to prove its identity
pub enum Candidate {
    /// A shared secret such as a password or API key
    Secret(String),
    /// A token issued by some authority
    Token(Box<dyn SecurityToken>),
    /// An adapter-specific object, interpreted by credentials that know its type
    Opaque(Box<dyn Any + Send + Sync>),
}

impl Candidate {
    /// A shared-secret candidate
    pub fn secret(secret: impl Into<String>) -> Self {
        Self::Secret(secret.into())
    }

    /// A token candidate
    pub fn token(token: impl SecurityToken + 'static) -> Self {
        Self::Token(Box::new(token))
    }

    /// An adapter-specific candidate
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Box::new(value))
    }

    /// Short description of the candidate kind, safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Secret(_) => "secret",
            Self::Token(_) => "token",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret(<redacted>)"),
            Self::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}
