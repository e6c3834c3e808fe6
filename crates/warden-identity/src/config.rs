//! Directory configuration
//!
//! Recognized keys of the flat [`ProviderConfig`] handed to
//! [`IdentityManager::initialize`](crate::IdentityManager::initialize):
//!
//! | key                                          | default      |
//! |----------------------------------------------|--------------|
//! | `directory.system.name`                      | `system`     |
//! | `directory.membership.nickname_prefix`       | `membership` |
//! | `directory.session.idle_timeout_secs`        | `1800`       |
//! | `directory.authentication.max_failed_attempts` | `0` (off)  |

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::{ProviderConfig, Result, WardenError};

const SYSTEM_NAME: &str = "directory.system.name";
const NICKNAME_PREFIX: &str = "directory.membership.nickname_prefix";
const IDLE_TIMEOUT_SECS: &str = "directory.session.idle_timeout_secs";
const MAX_FAILED_ATTEMPTS: &str = "directory.authentication.max_failed_attempts";

/// Settings of the in-memory directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Display name of the system subject
    pub system_name: String,
    /// Prefix of generated membership nicknames
    pub nickname_prefix: String,
    /// Subscribers idle for this long are unbound
    pub idle_timeout: Duration,
    /// Failed authentications before a subject is disabled; 0 disables lockout
    pub max_failed_attempts: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            system_name: "system".to_string(),
            nickname_prefix: "membership".to_string(),
            idle_timeout: Duration::from_secs(1800),
            max_failed_attempts: 0,
        }
    }
}

impl DirectoryConfig {
    /// Read the directory keys from a provider configuration
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in config.iter() {
            if key.starts_with("directory.") {
                settings.set_from_string(key, value)?;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Set one key from its string form
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            SYSTEM_NAME => self.system_name = value.to_string(),
            NICKNAME_PREFIX => self.nickname_prefix = value.to_string(),
            IDLE_TIMEOUT_SECS => {
                self.idle_timeout = Duration::from_secs(parse_number(key, value)?);
            }
            MAX_FAILED_ATTEMPTS => {
                self.max_failed_attempts = parse_number(key, value)?;
            }
            other => {
                tracing::debug!(key = other, "Ignoring unknown directory setting");
            }
        }
        Ok(())
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.system_name.trim().is_empty() {
            return Err(WardenError::identity(format!("{SYSTEM_NAME} must not be empty")));
        }
        if self.nickname_prefix.trim().is_empty() {
            return Err(WardenError::identity(format!(
                "{NICKNAME_PREFIX} must not be empty"
            )));
        }
        if self.idle_timeout.is_zero() {
            return Err(WardenError::identity(format!(
                "{IDLE_TIMEOUT_SECS} must be greater than zero"
            )));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        WardenError::identity(format!("configuration key '{key}' has invalid value '{value}'"))
    })
}
