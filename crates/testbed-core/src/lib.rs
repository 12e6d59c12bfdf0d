// crates/testbed-core/src/lib.rs
// ============================================================================
// Module: Testbed Core
// Description: Dependency-free building blocks for deterministic test fixtures.
// Purpose: Define the schema model, seed values, teardown stack, and overrides.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate holds the pure (no I/O) building blocks of Testbed:
//!
//! - [`schema`] — declarative relational tables with typed columns, primary
//!   keys, and foreign keys, ordered topologically so provisioning runs
//!   parents-first and teardown runs children-first.
//! - [`seed`] — typed seed rows keyed by primary key, so loaders can upsert
//!   idempotently.
//! - [`teardown`] — a LIFO stack of teardown actions that executes exactly
//!   once per scope, on explicit request or on drop.
//! - [`overrides`] — a stack-scoped dependency substitution map with RAII
//!   restoration, so overrides never leak across test boundaries.
//!
//! ## Invariants
//! - Schema ordering is deterministic for identical input.
//! - Teardown actions run last-acquired-first-released on every exit path.
//! - An override is visible only while its guard is alive.

pub mod overrides;
pub mod schema;
pub mod seed;
pub mod teardown;

pub use overrides::OverrideError;
pub use overrides::OverrideGuard;
pub use overrides::OverrideRegistry;
pub use schema::ColumnDef;
pub use schema::ColumnType;
pub use schema::ForeignKeyDef;
pub use schema::Schema;
pub use schema::SchemaError;
pub use schema::TableDef;
pub use seed::SeedBatch;
pub use seed::SeedError;
pub use seed::SeedRow;
pub use seed::SeedValue;
pub use teardown::TeardownError;
pub use teardown::TeardownFailure;
pub use teardown::TeardownStack;
