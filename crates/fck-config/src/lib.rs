// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the Federated Capability Kernel.
//!
//! This crate provides [`KernelBootConfig`] — the settings a host process
//! needs before it can construct and boot a kernel — together with helpers
//! for loading from a TOML file, applying environment variable overrides,
//! and producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// The storage directory does not yet exist on disk.
    StorageDirMissing {
        /// The configured path.
        path: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::StorageDirMissing { path } => {
                write!(f, "storage_dir '{path}' does not exist yet")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level settings a host process needs to construct and boot a kernel.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct KernelBootConfig {
    /// The agent identifier the kernel is constructed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Directory the file-backed storage adapter persists state under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,

    /// Path to the manifest to boot with when no persisted state exists yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_manifest_path: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for KernelBootConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            storage_dir: None,
            default_manifest_path: None,
            log_level: Some("info".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`KernelBootConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`KernelBootConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` is given but the file
/// cannot be read, or [`ConfigError::ParseError`] if the file is not valid
/// TOML or does not match [`KernelBootConfig`]'s shape.
pub fn load_config(path: Option<&Path>) -> Result<KernelBootConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => KernelBootConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`KernelBootConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `content` is not valid TOML or
/// does not match [`KernelBootConfig`]'s shape.
pub fn parse_toml(content: &str) -> Result<KernelBootConfig, ConfigError> {
    toml::from_str::<KernelBootConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `FCK_AGENT_ID`
/// - `FCK_STORAGE_DIR`
/// - `FCK_LOG_LEVEL`
pub fn apply_env_overrides(config: &mut KernelBootConfig) {
    if let Ok(val) = std::env::var("FCK_AGENT_ID") {
        config.agent_id = Some(val);
    }
    if let Ok(val) = std::env::var("FCK_STORAGE_DIR") {
        config.storage_dir = Some(val);
    }
    if let Ok(val) = std::env::var("FCK_LOG_LEVEL") {
        config.log_level = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (missing `agent_id`, invalid `log_level`) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if `agent_id` is unset or
/// `log_level` is not one of the recognised values.
pub fn validate_config(config: &KernelBootConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    match &config.agent_id {
        Some(id) if id.trim().is_empty() => errors.push("agent_id must not be empty".into()),
        None => errors.push("agent_id is required".into()),
        Some(_) => {}
    }

    if let Some(ref level) = config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!("invalid log_level '{level}'"));
        }
    }

    if let Some(ref dir) = config.storage_dir {
        if !Path::new(dir).exists() {
            warnings.push(ConfigWarning::StorageDirMissing { path: dir.clone() });
        }
    }

    if config.default_manifest_path.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "default_manifest_path".into(),
            hint: "boot will fail on first run unless persisted state already exists".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
