//! Security tokens
//!
//! A [`SecurityToken`] is an opaque, publicly serializable attribute bag with
//! hooks for integrity and origin verification. [`UnsecureToken`] is the
//! default implementation and proves neither.
//!
//! # Unsecured wire format
//!
//! ```text
//! {'attributes':[{'k1':'v1'},{'k2':'v2'}]}
//! ```
//!
//! Pairs are sorted ascending by key. Keys and values are single quoted and
//! never escaped, so both are restricted to word characters (`[A-Za-z0-9_]+`).
//! The restriction is enforced when a token is built as well as when one is
//! parsed; every token that can be formatted can be parsed back.

use crate::errors::{Result, WardenError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const FORMAT_PREFIX: &str = "{'attributes':[";

static PAIR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{'([A-Za-z0-9_]+)':'([A-Za-z0-9_]+)'\}").expect("attribute pair pattern is valid")
});

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9_]+$").expect("word pattern is valid")
});

/// Publicly serializable attribute bag
pub trait SecurityToken: Send + Sync + fmt::Debug {
    /// All token attributes
    fn attributes(&self) -> &BTreeMap<String, String>;

    /// Value of an attribute, if present
    fn find_attribute(&self, name: &str) -> Option<&str> {
        self.attributes().get(name).map(String::as_str)
    }

    /// Value of an attribute, or a computed default
    fn attribute_or_else(&self, name: &str, default: &dyn Fn() -> String) -> String {
        self.find_attribute(name)
            .map_or_else(default, ToString::to_string)
    }

    /// Whether the token's content is proven unmodified
    fn verify_integrity(&self) -> bool;

    /// Whether the token's issuer is proven
    fn verify_originator(&self) -> bool;

    /// Public string form of the token
    fn as_string(&self) -> String;
}

/// Non-secure placeholder token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsecureToken {
    attributes: BTreeMap<String, String>,
}

impl UnsecureToken {
    /// Create a token from an attribute mapping
    ///
    /// Fails with an unsupported-format error when a key or value contains
    /// anything other than word characters.
    pub fn new(attributes: BTreeMap<String, String>) -> Result<Self> {
        for (key, value) in &attributes {
            if !is_word(key) || !is_word(value) {
                return Err(WardenError::unsupported_format(format!(
                    "attribute '{key}' with value '{value}' cannot be represented \
                     in the unsecured token format"
                )));
            }
        }
        Ok(Self { attributes })
    }

    /// Start building a token
    pub fn builder() -> TokenBuilder {
        TokenBuilder::default()
    }

    /// Parse the unsecured wire format
    pub fn parse(token: &str) -> Result<Self> {
        if !token.starts_with(FORMAT_PREFIX) {
            return Err(WardenError::unsupported_format("Not a valid security token"));
        }

        let attributes = PAIR_PATTERN
            .captures_iter(token)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect();
        Ok(Self { attributes })
    }
}

impl SecurityToken for UnsecureToken {
    fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn verify_integrity(&self) -> bool {
        false
    }

    fn verify_originator(&self) -> bool {
        false
    }

    fn as_string(&self) -> String {
        let pairs = self
            .attributes
            .iter()
            .map(|(k, v)| format!("{{'{k}':'{v}'}}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{FORMAT_PREFIX}{pairs}]}}")
    }
}

impl fmt::Display for UnsecureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for UnsecureToken {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Accumulates attributes for an [`UnsecureToken`]
#[derive(Debug, Default)]
pub struct TokenBuilder {
    attributes: BTreeMap<String, String>,
}

impl TokenBuilder {
    /// Set an attribute, replacing any previous value
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Build the token, validating every attribute
    pub fn build(self) -> Result<UnsecureToken> {
        UnsecureToken::new(self.attributes)
    }
}

fn is_word(s: &str) -> bool {
    WORD_PATTERN.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EXPECTED_FORMATTED: &str = "{'attributes':[{'att1':'val1'},{'att2':'val2'}]}";

    fn expected_attributes() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("att2".to_string(), "val2".to_string()),
            ("att1".to_string(), "val1".to_string()),
        ])
    }

    #[test]
    fn test_format_sorts_by_key() {
        let token = UnsecureToken::new(expected_attributes()).unwrap();
        assert_eq!(token.as_string(), EXPECTED_FORMATTED);
    }

    #[test]
    fn test_parse() {
        let token = UnsecureToken::parse(EXPECTED_FORMATTED).unwrap();
        assert_eq!(token.attributes(), &expected_attributes());
    }

    #[test]
    fn test_invalid_parse() {
        let err = "junk".parse::<UnsecureToken>().unwrap_err();
        assert!(matches!(err, WardenError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_builder() {
        let token = UnsecureToken::builder()
            .attribute("att1", "val1")
            .attribute("att2", "val2")
            .build()
            .unwrap();
        assert_eq!(token.find_attribute("att1"), Some("val1"));
        assert_eq!(token.attribute_or_else("missing", &|| "fallback".to_string()), "fallback");
    }

    #[test]
    fn test_rejects_values_the_parser_cannot_read() {
        let err = UnsecureToken::builder()
            .attribute("name", "two words")
            .build()
            .unwrap_err();
        assert!(matches!(err, WardenError::UnsupportedFormat { .. }));

        let err = UnsecureToken::builder().attribute("it's", "x").build().unwrap_err();
        assert!(matches!(err, WardenError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_never_verifies() {
        let token = UnsecureToken::default();
        assert!(!token.verify_integrity());
        assert!(!token.verify_originator());
        assert_eq!(token.as_string(), "{'attributes':[]}");
    }

    proptest! {
        #[test]
        fn round_trip_word_attributes(
            attributes in prop::collection::btree_map("[A-Za-z0-9_]{1,12}", "[A-Za-z0-9_]{1,12}", 0..8)
        ) {
            let token = UnsecureToken::new(attributes.clone()).unwrap();
            let parsed = UnsecureToken::parse(&token.as_string()).unwrap();
            prop_assert_eq!(parsed.attributes(), &attributes);
        }
    }
}
