#![forbid(unsafe_code)]

//! Policy-as-data configuration for Catcher.
//!
//! [`CatcherConfig`] groups the tunables of the batch-update controller and
//! the key-existence prober. It can be loaded from TOML or JSON when the
//! `policy-config` feature is enabled.
//!
//! ```toml
//! # catcher.toml
//! [batch]
//! preflight_check = true
//!
//! [probe]
//! accessor_conventions = true
//! ivar_prefixes = ["_"]
//! ```
//!
//! ```rust,ignore
//! let config = CatcherConfig::from_toml_file("catcher.toml")?;
//! ```
//!
//! `CatcherConfig::default()` reproduces the behavior of a controller and
//! prober built without any configuration.

#[cfg(feature = "policy-config")]
use std::path::Path;

#[cfg(feature = "policy-config")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct CatcherConfig {
    /// Batch-update controller parameters.
    pub batch: BatchPolicyConfig,
    /// Key-existence prober parameters.
    pub probe: ProbeConfig,
}

impl CatcherConfig {
    /// Load from a TOML string.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validated()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "policy-config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validated()
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "policy-config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Validate all parameters.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (idx, prefix) in self.probe.ivar_prefixes.iter().enumerate() {
            if prefix.is_empty() {
                errors.push(format!("probe.ivar_prefixes[{idx}] must not be empty"));
            } else if prefix.chars().any(char::is_whitespace) {
                errors.push(format!(
                    "probe.ivar_prefixes[{idx}] must not contain whitespace, got {prefix:?}"
                ));
            }
        }

        errors
    }

    /// Consume the config, failing if [`validate`](Self::validate) reports
    /// anything.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Batch-update controller parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct BatchPolicyConfig {
    /// Run the consistency check before attempting a batch and reload the
    /// surface instead when it fails. The recovery policy is never consulted
    /// for a batch that was skipped this way.
    pub preflight_check: bool,
}

/// Key-existence prober parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct ProbeConfig {
    /// Also accept `getKey` / `isKey` accessors for a camel-case `key`.
    pub accessor_conventions: bool,
    /// Prefixes under which stored fields may be recorded.
    pub ivar_prefixes: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            accessor_conventions: true,
            ivar_prefixes: vec!["_".to_owned()],
        }
    }
}
