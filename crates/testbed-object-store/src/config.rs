// crates/testbed-object-store/src/config.rs
// ============================================================================
// Module: Object Store Config
// Description: Validated configuration for fixture bucket backends.
// Purpose: Select and parameterize the memory or S3 backend from TOML.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Fixture suites describe their object-store backend declaratively: the
//! in-memory mock for unit and integration tests, or an S3-compatible
//! endpoint (MinIO-style: endpoint URL, static credentials, path-style
//! addressing) for suites that run against deployed storage.
//! [`ObjectStoreConfig::validate`] rejects inconsistent input before any
//! client is constructed, so misconfiguration fails the fixture immediately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Object-store configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Bucket name violates S3 naming rules.
    #[error("invalid bucket name: {bucket:?}")]
    InvalidBucket {
        /// Offending bucket name.
        bucket: String,
    },
    /// Credentials must be supplied as a pair.
    #[error("access_key and secret_key must be set together")]
    PartialCredentials,
    /// The S3 provider needs an addressing target.
    #[error("s3 provider requires a region or an endpoint")]
    MissingTarget,
    /// TOML parse failure.
    #[error("config parse error: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Backend selector for the bucket store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreProvider {
    /// In-memory mock store; state lives for the owning fixture's scope.
    #[default]
    Memory,
    /// S3-compatible endpoint (AWS, MinIO, and friends).
    S3,
}

/// Object-store configuration for a fixture.
///
/// # Invariants
/// - [`ObjectStoreConfig::validate`] passes before a backend is built.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Backend selector.
    #[serde(default)]
    pub provider: ObjectStoreProvider,
    /// Bucket provisioned for the fixture.
    pub bucket: String,
    /// Region for S3-compatible backends.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint URL for S3-compatible backends (MinIO-style).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static access key; paired with `secret_key`.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Static secret key; paired with `access_key`.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Path-style addressing, required by most MinIO deployments.
    #[serde(default)]
    pub force_path_style: bool,
}

impl ObjectStoreConfig {
    /// Creates a memory-backend config for the given bucket.
    #[must_use]
    pub fn memory(bucket: &str) -> Self {
        Self {
            provider: ObjectStoreProvider::Memory,
            bucket: bucket.to_string(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
        }
    }

    /// Parses a config from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bucket name, credentials, or
    /// addressing target is inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_bucket_name(&self.bucket) {
            return Err(ConfigError::InvalidBucket {
                bucket: self.bucket.clone(),
            });
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ConfigError::PartialCredentials);
        }
        if self.provider == ObjectStoreProvider::S3
            && self.region.is_none()
            && self.endpoint.is_none()
        {
            return Err(ConfigError::MissingTarget);
        }
        Ok(())
    }
}

/// Checks a bucket name against the portable subset of S3 naming rules.
#[must_use]
pub fn is_valid_bucket_name(name: &str) -> bool {
    let length_ok = (3 ..= 63).contains(&name.len());
    let charset_ok =
        name.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    let edges_ok = !name.starts_with('-') && !name.ends_with('-');
    length_ok && charset_ok && edges_ok
}

// ============================================================================
// SECTION: Tests
// ============================================================================
