// crates/testbed-harness/src/tenant.rs
// ============================================================================
// Module: Tenant Resolution
// Description: Tenant dependency seam for in-process test clients.
// Purpose: Resolve the caller's tenant from request headers, with a fixed
//          stand-in installable for one test's scope.
// Dependencies: axum, testbed-core, thiserror
// ============================================================================

//! ## Overview
//! Services under test resolve their tenant from request credentials. The
//! harness models that as a [`TenantResolver`] seam registered in the
//! override registry: the real [`HeaderTenantResolver`] checks a bearer
//! token header, and tests substitute a [`StaticTenantResolver`] for the
//! duration of one scope. Handlers resolve through
//! [`resolve_tenant`], so an installed override is visible to every request
//! the test client makes — and to nothing outside the owning guard.
//!
//! ## Invariants
//! - Resolution fails closed: missing or mismatched credentials deny.
//! - Overrides are scoped; a dropped guard restores the header resolver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::http::HeaderMap;
use testbed_core::OverrideError;
use testbed_core::OverrideRegistry;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the tenant bearer token.
pub const TOKEN_HEADER: &str = "x-api-token";

/// Dependency key the tenant resolver registers under.
pub const TENANT_RESOLVER: &str = "tenant_resolver";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tenant resolution errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Token header absent.
    #[error("missing {TOKEN_HEADER} header")]
    MissingToken,
    /// Token header present but wrong.
    #[error("invalid token")]
    InvalidToken,
    /// Resolver could not be resolved from the registry.
    #[error("tenant resolver unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Tenant Context
// ============================================================================

/// The resolved tenant identity for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// Tenant name.
    pub name: String,
}

impl TenantContext {
    /// Creates a context for a named tenant.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Resolver Seam
// ============================================================================

/// Tenant resolution interface.
pub trait TenantResolver: Send + Sync {
    /// Resolves the tenant for a request, failing closed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when credentials are missing or wrong.
    fn resolve(&self, headers: &HeaderMap) -> Result<TenantContext, AuthError>;
}

/// Shared resolver handle stored in the override registry.
pub type SharedTenantResolver = Arc<dyn TenantResolver>;

/// Real resolver: checks the bearer token header against a fixed token.
#[derive(Debug)]
pub struct HeaderTenantResolver {
    /// Tenant granted on a token match.
    tenant: TenantContext,
    /// Accepted token value.
    token: String,
}

impl HeaderTenantResolver {
    /// Creates a resolver granting `tenant` for `token`.
    #[must_use]
    pub fn new(tenant: TenantContext, token: &str) -> Self {
        Self {
            tenant,
            token: token.to_string(),
        }
    }
}

impl TenantResolver for HeaderTenantResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<TenantContext, AuthError> {
        let presented = headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        if presented == self.token {
            Ok(self.tenant.clone())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Test stand-in: always resolves a fixed tenant, ignoring credentials.
#[derive(Debug)]
pub struct StaticTenantResolver {
    /// Tenant returned for every request.
    tenant: TenantContext,
}

impl StaticTenantResolver {
    /// Creates a resolver pinned to `tenant`.
    #[must_use]
    pub const fn new(tenant: TenantContext) -> Self {
        Self {
            tenant,
        }
    }
}

impl TenantResolver for StaticTenantResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Result<TenantContext, AuthError> {
        Ok(self.tenant.clone())
    }
}

// ============================================================================
// SECTION: Registry Integration
// ============================================================================

/// Resolves the tenant through whichever resolver is currently installed.
///
/// # Errors
///
/// Returns [`AuthError`] when no resolver is registered or resolution fails.
pub fn resolve_tenant(
    registry: &OverrideRegistry,
    headers: &HeaderMap,
) -> Result<TenantContext, AuthError> {
    let resolver: Arc<SharedTenantResolver> = registry
        .resolve::<SharedTenantResolver>(TENANT_RESOLVER)
        .map_err(|err: OverrideError| AuthError::Unavailable(err.to_string()))?;
    resolver.resolve(headers)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
