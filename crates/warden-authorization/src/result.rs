//! Three-valued authorization results
//!
//! ```text
//! DENIED  >  AUTHORIZED  >  ABSTAIN
//! ```
//!
//! Merging keeps the dominant operand: DENIED absorbs everything and ABSTAIN is
//! the identity, so merging is associative and commutative and an empty
//! merge is ABSTAIN.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of evaluating one or more constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationResult {
    /// The session may perform the action
    Authorized,
    /// The session may not perform the action
    Denied,
    /// No opinion; the caller decides
    Abstain,
}

impl AuthorizationResult {
    /// Merge two results, keeping the dominant one
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Denied, _) | (_, Self::Denied) => Self::Denied,
            (Self::Authorized, _) | (_, Self::Authorized) => Self::Authorized,
            (Self::Abstain, Self::Abstain) => Self::Abstain,
        }
    }

    /// Reduce any number of results left to right; empty input is ABSTAIN
    pub fn merge_all<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        results.into_iter().fold(Self::Abstain, Self::merge)
    }

    /// True only for an explicit authorization
    pub fn is_authorized(self) -> bool {
        self == Self::Authorized
    }

    /// True for an explicit denial
    pub fn is_denied(self) -> bool {
        self == Self::Denied
    }
}

impl fmt::Display for AuthorizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authorized => "AUTHORIZED",
            Self::Denied => "DENIED",
            Self::Abstain => "ABSTAIN",
        })
    }
}


#[cfg(test)]
mod proptest_merge_laws {
    use super::*;
    use proptest::prelude::*;

    fn arb_result() -> impl Strategy<Value = AuthorizationResult> {
        prop_oneof![
            Just(AuthorizationResult::Authorized),
            Just(AuthorizationResult::Denied),
            Just(AuthorizationResult::Abstain),
        ]
    }

    proptest! {
        /// Associativity: (a ⊕ b) ⊕ c == a ⊕ (b ⊕ c)
        #[test]
        fn merge_associative(a in arb_result(), b in arb_result(), c in arb_result()) {
            prop_assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
        }

        /// Commutativity: a ⊕ b == b ⊕ a
        #[test]
        fn merge_commutative(a in arb_result(), b in arb_result()) {
            prop_assert_eq!(a.merge(b), b.merge(a));
        }

        /// DENIED absorbs every result
        #[test]
        fn denied_absorbs(x in arb_result()) {
            prop_assert_eq!(AuthorizationResult::Denied.merge(x), AuthorizationResult::Denied);
        }

        /// ABSTAIN is the identity
        #[test]
        fn abstain_is_identity(x in arb_result()) {
            prop_assert_eq!(AuthorizationResult::Abstain.merge(x), x);
        }

        /// Reduction order does not matter
        #[test]
        fn merge_all_order_independent(mut results in prop::collection::vec(arb_result(), 0..16)) {
            let forward = AuthorizationResult::merge_all(results.clone());
            results.reverse();
            prop_assert_eq!(AuthorizationResult::merge_all(results), forward);
        }
    }
}
