//! Identity assurance levels
//!
//! Levels follow the NIST SP 800-63 numbering: a higher level means the
//! subject's identity was verified more confidently. A session's assurance is
//! the maximum level reached by any authentication during its lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric strength rating of an authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssuranceLevel(u8);

impl AssuranceLevel {
    /// No authentication has taken place
    pub const NONE: Self = Self(0);
    /// Little or no confidence in the asserted identity
    pub const LEVEL_1: Self = Self(1);
    /// Some confidence, single factor
    pub const LEVEL_2: Self = Self(2);
    /// High confidence, multi-factor
    pub const LEVEL_3: Self = Self(3);
    /// Very high confidence, hardware-backed
    pub const LEVEL_4: Self = Self(4);

    /// Create an assurance level from its numeric value
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// Numeric value of the level
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The stronger of two levels
    #[must_use]
    pub fn elevate(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LOA-{}", self.0)
    }
}

impl From<u8> for AssuranceLevel {
    fn from(level: u8) -> Self {
        Self(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elevate_never_lowers() {
        let current = AssuranceLevel::LEVEL_2;
        assert_eq!(current.elevate(AssuranceLevel::LEVEL_1), AssuranceLevel::LEVEL_2);
        assert_eq!(current.elevate(AssuranceLevel::LEVEL_3), AssuranceLevel::LEVEL_3);
    }

    #[test]
    fn display_uses_loa_prefix() {
        assert_eq!(AssuranceLevel::new(3).to_string(), "LOA-3");
    }
}
