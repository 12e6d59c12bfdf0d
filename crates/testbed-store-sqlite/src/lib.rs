// crates/testbed-store-sqlite/src/lib.rs
// ============================================================================
// Module: Testbed SQLite Store
// Description: Fixture-facing database lifecycle over SQLite.
// Purpose: Provision schemas, seed rows idempotently, and tear down in
//          dependency order with sequence reset.
// Dependencies: testbed-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! This crate implements the database half of the fixture lifecycle against
//! `SQLite`: [`create_all`] / [`drop_all`] provisioning, the upsert-based
//! [`seed`] loader, and the transactional [`clear`] teardown sequencer that
//! deletes children before parents and restarts autoincrement sequences.

mod store;

pub use store::StoreError;
pub use store::clear;
pub use store::create_all;
pub use store::drop_all;
pub use store::existing_tables;
pub use store::seed;
