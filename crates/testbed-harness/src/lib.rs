// crates/testbed-harness/src/lib.rs
// ============================================================================
// Module: Testbed Harness
// Description: Fixture composition for integration test suites.
// Purpose: Provision, seed, yield, and tear down isolated test state with
//          an in-process HTTP client and scoped dependency overrides.
// Dependencies: testbed-core, testbed-store-sqlite, testbed-object-store,
//               axum, tower, http-body-util, rusqlite
// ============================================================================

//! ## Overview
//! The harness ties the lifecycle pieces together for one test scope:
//! provision the relational schema and object-store bucket, seed fixed
//! rows and objects, hand an in-process client to the test body, and tear
//! everything down exactly once in reverse acquisition order — whether the
//! body returned normally or panicked.

pub mod client;
pub mod config;
pub mod events;
mod harness;
pub mod tenant;

pub use client::ClientError;
pub use client::TestClient;
pub use client::TestResponse;
pub use config::DatabaseConfig;
pub use config::HarnessConfig;
pub use config::HarnessConfigError;
pub use config::TenantConfig;
pub use events::FixtureEvent;
pub use events::FixtureEventSink;
pub use events::FixturePhase;
pub use events::NoopEventSink;
pub use events::RecordingEventSink;
pub use harness::Harness;
pub use harness::HarnessError;
pub use tenant::AuthError;
pub use tenant::HeaderTenantResolver;
pub use tenant::SharedTenantResolver;
pub use tenant::StaticTenantResolver;
pub use tenant::TENANT_RESOLVER;
pub use tenant::TOKEN_HEADER;
pub use tenant::TenantContext;
pub use tenant::TenantResolver;
pub use tenant::resolve_tenant;
