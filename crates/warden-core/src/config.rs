//! Provider configuration
//!
//! Every provider and identity manager receives a flat, string-keyed
//! [`ProviderConfig`] at initialization. The recognized keys are provider
//! specific; this type only offers typed access and a few loaders.

use crate::errors::{Result, WardenError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Flat string-keyed configuration mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfig {
    properties: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, replacing any previous value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a property, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.properties.insert(key.into(), value.into())
    }

    /// Value of a property
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Value of a property or a default
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Value of a property that must be present
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            WardenError::identity(format!("required configuration property '{key}' is missing"))
        })
    }

    /// Parse a property, if present
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    WardenError::identity(format!(
                        "configuration property '{key}' has invalid value '{raw}': {e}"
                    ))
                })
            })
            .transpose()
    }

    /// Iterate over all properties in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Properties under `prefix.`, with the prefix removed
    pub fn scoped(&self, prefix: &str) -> ProviderConfig {
        let prefix = format!("{prefix}.");
        let properties = self
            .properties
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect();
        Self { properties }
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether there are no properties
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Load a TOML document, flattening nested tables into dotted keys
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;
        let mut config = Self::new();
        flatten_toml("", &toml::Value::Table(table), &mut config.properties)?;
        Ok(config)
    }

    /// Overlay environment variables starting with `PREFIX_`
    ///
    /// `PREFIX_SESSION_IDLE_TIMEOUT` becomes `session.idle.timeout`.
    pub fn merge_env(&mut self, prefix: &str) {
        self.merge_vars(prefix, std::env::vars());
    }

    fn merge_vars(&mut self, prefix: &str, vars: impl IntoIterator<Item = (String, String)>) {
        let prefix = format!("{prefix}_");
        for (key, value) in vars {
            if let Some(rest) = key.strip_prefix(&prefix) {
                let config_key = rest.to_lowercase().replace('_', ".");
                self.properties.insert(config_key, value);
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProviderConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn flatten_toml(
    prefix: &str,
    value: &toml::Value,
    out: &mut BTreeMap<String, String>,
) -> Result<()> {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_toml(&key, nested, out)?;
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        toml::Value::Integer(i) => {
            out.insert(prefix.to_string(), i.to_string());
        }
        toml::Value::Float(f) => {
            out.insert(prefix.to_string(), f.to_string());
        }
        toml::Value::Boolean(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        toml::Value::Datetime(dt) => {
            out.insert(prefix.to_string(), dt.to_string());
        }
        toml::Value::Array(_) => {
            return Err(WardenError::unsupported_format(format!(
                "configuration property '{prefix}' is an array; provider configuration is flat"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let config = ProviderConfig::new()
            .with("session.idle_timeout_secs", "60")
            .with("name", "primary");

        assert_eq!(config.get("name"), Some("primary"));
        assert_eq!(config.get_or("missing", "dflt"), "dflt");
        assert_eq!(config.parse::<u64>("session.idle_timeout_secs").unwrap(), Some(60));
        assert_eq!(config.parse::<u64>("missing").unwrap(), None);
    }

    #[test]
    fn test_require_and_bad_values_are_identity_errors() {
        let config = ProviderConfig::new().with("limit", "many");
        assert!(config.require("absent").unwrap_err().is_identity_error());
        assert!(config.parse::<u32>("limit").unwrap_err().is_identity_error());
    }

    #[test]
    fn test_from_toml_flattens_tables() {
        let config = ProviderConfig::from_toml_str(
            r#"
            [directory.session]
            idle_timeout_secs = 90

            [directory.system]
            name = "root"
            "#,
        )
        .unwrap();

        assert_eq!(config.get("directory.session.idle_timeout_secs"), Some("90"));
        assert_eq!(config.get("directory.system.name"), Some("root"));

        let scoped = config.scoped("directory.system");
        assert_eq!(scoped.get("name"), Some("root"));
        assert_eq!(scoped.len(), 1);
    }

    #[test]
    fn test_toml_arrays_rejected() {
        let err = ProviderConfig::from_toml_str("list = [1, 2]").unwrap_err();
        assert!(matches!(err, WardenError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_merge_vars_maps_underscores_to_dots() {
        let mut config = ProviderConfig::new();
        config.merge_vars(
            "WARDEN",
            vec![
                ("WARDEN_SYSTEM_NAME".to_string(), "env-root".to_string()),
                ("OTHER_KEY".to_string(), "ignored".to_string()),
            ],
        );
        assert_eq!(config.get("system.name"), Some("env-root"));
        assert_eq!(config.len(), 1);
    }
}
