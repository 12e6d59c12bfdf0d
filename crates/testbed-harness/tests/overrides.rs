//! Dependency override tests for testbed-harness.
// crates/testbed-harness/tests/overrides.rs
// =============================================================================
// Module: Override Scope Tests
// Description: Scoped tenant substitution observed through the test client.
// Purpose: Prove overrides apply to every in-scope request and leak nowhere.
// =============================================================================

use axum::Extension;
use axum::Router;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use testbed_core::ColumnDef;
use testbed_core::ColumnType;
use testbed_core::OverrideRegistry;
use testbed_core::Schema;
use testbed_core::TableDef;
use testbed_harness::Harness;
use testbed_harness::HarnessConfig;
use testbed_harness::TOKEN_HEADER;
use testbed_harness::resolve_tenant;

type TestResult = Result<(), String>;

/// Handler resolving the tenant through whichever resolver is installed.
async fn whoami(
    Extension(registry): Extension<OverrideRegistry>,
    headers: HeaderMap,
) -> Response {
    match resolve_tenant(&registry, &headers) {
        Ok(tenant) => (StatusCode::OK, tenant.name).into_response(),
        Err(err) => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
    }
}

/// Router exposing the tenant seam.
fn whoami_router() -> Router {
    Router::new().route("/whoami", get(whoami))
}

/// Minimal single-table schema; these tests exercise the override seam only.
fn tiny_schema() -> Result<Schema, String> {
    let table = TableDef::new("markers")
        .map_err(|err| err.to_string())?
        .with_column(
            ColumnDef::new("id", ColumnType::Integer)
                .map_err(|err| err.to_string())?
                .primary_key(),
        );
    Schema::new(vec![table]).map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Real Resolver Path
// ============================================================================

#[tokio::test]
async fn real_resolver_requires_the_configured_token() -> TestResult {
    let config = HarnessConfig::in_memory("tenant-x", "secret");
    let harness = Harness::provision(&config, tiny_schema()?).map_err(|err| err.to_string())?;
    let client = harness.client(whoami_router());

    let denied = client.get("/whoami").await.map_err(|err| err.to_string())?;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .clone()
        .with_header(TOKEN_HEADER, "wrong")
        .map_err(|err| err.to_string())?
        .get("/whoami")
        .await
        .map_err(|err| err.to_string())?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let granted = client
        .with_header(TOKEN_HEADER, harness.token())
        .map_err(|err| err.to_string())?
        .get("/whoami")
        .await
        .map_err(|err| err.to_string())?;
    assert_eq!(granted.status(), StatusCode::OK);
    assert_eq!(granted.text().map_err(|err| err.to_string())?, "tenant-x");

    harness.finish().map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Scoped Substitution
// ============================================================================

#[tokio::test]
async fn override_applies_to_every_request_until_the_guard_drops() -> TestResult {
    let config = HarnessConfig::in_memory("tenant-x", "secret");
    let harness = Harness::provision(&config, tiny_schema()?).map_err(|err| err.to_string())?;
    let client = harness.client(whoami_router());

    {
        let _guard =
            harness.override_tenant("override-tenant").map_err(|err| err.to_string())?;
        for _ in 0..3 {
            let response = client.get("/whoami").await.map_err(|err| err.to_string())?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.text().map_err(|err| err.to_string())?, "override-tenant");
        }
    }

    // Guard dropped: the header resolver is back and fails closed.
    let restored = client.get("/whoami").await.map_err(|err| err.to_string())?;
    assert_eq!(restored.status(), StatusCode::UNAUTHORIZED);

    harness.finish().map_err(|err| err.to_string())
}

#[tokio::test]
async fn override_does_not_leak_into_the_next_scope() -> TestResult {
    let config = HarnessConfig::in_memory("tenant-x", "secret");
    {
        let harness =
            Harness::provision(&config, tiny_schema()?).map_err(|err| err.to_string())?;
        let _guard =
            harness.override_tenant("override-tenant").map_err(|err| err.to_string())?;
        let client = harness.client(whoami_router());
        let response = client.get("/whoami").await.map_err(|err| err.to_string())?;
        assert_eq!(response.text().map_err(|err| err.to_string())?, "override-tenant");
    }

    // A fresh scope that requested no override sees only the real resolver.
    let harness = Harness::provision(&config, tiny_schema()?).map_err(|err| err.to_string())?;
    let client = harness.client(whoami_router());
    let denied = client.get("/whoami").await.map_err(|err| err.to_string())?;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let granted = client
        .with_header(TOKEN_HEADER, harness.token())
        .map_err(|err| err.to_string())?
        .get("/whoami")
        .await
        .map_err(|err| err.to_string())?;
    assert_eq!(granted.text().map_err(|err| err.to_string())?, "tenant-x");

    harness.finish().map_err(|err| err.to_string())
}
