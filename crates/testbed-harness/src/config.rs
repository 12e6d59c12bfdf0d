// crates/testbed-harness/src/config.rs
// ============================================================================
// Module: Harness Config
// Description: Declarative configuration for a fixture harness.
// Purpose: Describe the database, object store, and tenant in one TOML
//          document with up-front validation.
// Dependencies: serde, toml, testbed-object-store, thiserror
// ============================================================================

//! ## Overview
//! A harness is configured declaratively: where the database lives (a file
//! path, or in-memory when omitted), which object-store backend to use, and
//! the tenant identity the service-under-test authenticates. Validation runs
//! before any resource is provisioned, so misconfiguration fails the fixture
//! immediately rather than mid-setup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use testbed_object_store::ConfigError as ObjectStoreConfigError;
use testbed_object_store::ObjectStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Harness configuration errors.
#[derive(Debug, Error)]
pub enum HarnessConfigError {
    /// TOML parse failure.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Object-store section failed validation.
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreConfigError),
    /// Tenant section is incomplete.
    #[error("tenant {field} must not be empty")]
    EmptyTenantField {
        /// Offending field name.
        field: &'static str,
    },
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Database location for the harness.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Database file path; `None` provisions an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Tenant identity the service-under-test authenticates.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Tenant name; doubles as the fixture bucket's logical owner.
    pub name: String,
    /// Bearer token the header resolver accepts.
    pub token: String,
}

/// Full harness configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// Database section.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Object-store section.
    pub object_store: ObjectStoreConfig,
    /// Tenant section.
    pub tenant: TenantConfig,
}

impl HarnessConfig {
    /// Builds the default all-in-memory configuration for a tenant.
    #[must_use]
    pub fn in_memory(tenant: &str, token: &str) -> Self {
        Self {
            database: DatabaseConfig::default(),
            object_store: ObjectStoreConfig::memory(tenant),
            tenant: TenantConfig {
                name: tenant.to_string(),
                token: token.to_string(),
            },
        }
    }

    /// Parses a config from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessConfigError`] on parse or validation failure.
    pub fn from_toml_str(raw: &str) -> Result<Self, HarnessConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|err| HarnessConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessConfigError`] when any section is inconsistent.
    pub fn validate(&self) -> Result<(), HarnessConfigError> {
        self.object_store.validate()?;
        if self.tenant.name.is_empty() {
            return Err(HarnessConfigError::EmptyTenantField {
                field: "name",
            });
        }
        if self.tenant.token.is_empty() {
            return Err(HarnessConfigError::EmptyTenantField {
                field: "token",
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
