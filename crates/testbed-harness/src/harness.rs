// crates/testbed-harness/src/harness.rs
// ============================================================================
// Module: Fixture Harness
// Description: Composes database, bucket, and override fixtures around a test.
// Purpose: Provision isolated state, seed it, hand control to a test body,
//          and tear everything down exactly once in reverse order.
// Dependencies: testbed-core, testbed-store-sqlite, testbed-object-store,
//               rusqlite, axum, thiserror
// ============================================================================

//! ## Overview
//! The [`Harness`] is the fixture composer: it provisions the relational
//! schema and the object-store bucket, registers the real tenant resolver,
//! and stacks one teardown action per resource. Teardown runs exactly once —
//! on [`Harness::finish`] or, if the test body panicked, on drop — in
//! reverse acquisition order: overrides (via their own guards), then the
//! bucket (objects before the bucket itself), then the database (children
//! before parents, sequences restarted).
//!
//! ## Invariants
//! - Setup failures abort immediately; nothing retries.
//! - A harness owns its connection and store exclusively for its scope.
//! - Teardown failure is reported wholesale through [`Harness::finish`];
//!   the drop path is last-resort only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use axum::Extension;
use axum::Router;
use rusqlite::Connection;
use testbed_core::OverrideError;
use testbed_core::OverrideGuard;
use testbed_core::OverrideRegistry;
use testbed_core::Schema;
use testbed_core::SeedBatch;
use testbed_core::TeardownError;
use testbed_core::TeardownStack;
use testbed_object_store::BucketFixture;
use testbed_object_store::BucketStore;
use testbed_object_store::BucketStoreError;
use testbed_object_store::open_store;
use testbed_store_sqlite::StoreError;
use testbed_store_sqlite::clear;
use testbed_store_sqlite::create_all;
use testbed_store_sqlite::drop_all;
use testbed_store_sqlite::seed;
use thiserror::Error;

use crate::client::TestClient;
use crate::config::HarnessConfig;
use crate::config::HarnessConfigError;
use crate::events::FixtureEvent;
use crate::events::FixtureEventSink;
use crate::events::FixturePhase;
use crate::events::NoopEventSink;
use crate::tenant::HeaderTenantResolver;
use crate::tenant::SharedTenantResolver;
use crate::tenant::StaticTenantResolver;
use crate::tenant::TENANT_RESOLVER;
use crate::tenant::TenantContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Harness lifecycle errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] HarnessConfigError),
    /// Connection open or lock failure.
    #[error("database error: {0}")]
    Db(String),
    /// Database provisioning, seeding, or teardown failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Object-store provisioning or teardown failure.
    #[error(transparent)]
    Bucket(#[from] BucketStoreError),
    /// Override registry failure.
    #[error(transparent)]
    Override(#[from] OverrideError),
    /// Aggregate teardown failure.
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Shared connection handle; teardown actions hold their own reference.
type SharedConnection = Arc<Mutex<Connection>>;

/// Composed fixture: database + bucket + overrides, torn down LIFO.
pub struct Harness {
    /// Exclusive database connection for this scope.
    conn: SharedConnection,
    /// Provisioned schema.
    schema: Schema,
    /// Provisioned bucket handle.
    bucket: BucketFixture,
    /// Dependency registry the test client resolves through.
    registry: OverrideRegistry,
    /// Teardown actions in acquisition order.
    teardown: TeardownStack,
    /// Lifecycle event sink.
    events: Arc<dyn FixtureEventSink>,
    /// Tenant identity granted by the real resolver.
    tenant: TenantContext,
    /// Token the real resolver accepts.
    token: String,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("tenant", &self.tenant)
            .field("bucket", &self.bucket.bucket())
            .field("pending_teardowns", &self.teardown.pending())
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Provisions a harness with events discarded.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when any setup step fails; setup failures
    /// abort immediately.
    pub fn provision(config: &HarnessConfig, schema: Schema) -> Result<Self, HarnessError> {
        Self::provision_with_events(config, schema, Arc::new(NoopEventSink))
    }

    /// Provisions a harness, reporting lifecycle phases to `events`.
    ///
    /// Setup order is database, then bucket, then the real tenant resolver;
    /// teardown runs the reverse.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when any setup step fails.
    pub fn provision_with_events(
        config: &HarnessConfig,
        schema: Schema,
        events: Arc<dyn FixtureEventSink>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        let mut teardown = TeardownStack::new();

        // Database: drop residue, create fresh, clear rows and sequences.
        let mut raw = match &config.database.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|err| HarnessError::Db(err.to_string()))?;
        raw.pragma_update(None, "foreign_keys", true)
            .map_err(|err| HarnessError::Db(err.to_string()))?;
        drop_all(&raw, &schema)?;
        create_all(&raw, &schema)?;
        clear(&mut raw, &schema)?;
        let conn: SharedConnection = Arc::new(Mutex::new(raw));
        events.record(FixtureEvent {
            phase: FixturePhase::Setup,
            resource: "database",
        });
        {
            let conn = Arc::clone(&conn);
            let schema = schema.clone();
            let events = Arc::clone(&events);
            teardown.push("database", move || {
                let mut guard =
                    conn.lock().map_err(|_| "connection lock poisoned".to_string())?;
                clear(&mut guard, &schema).map_err(|err| err.to_string())?;
                events.record(FixtureEvent {
                    phase: FixturePhase::Teardown,
                    resource: "database",
                });
                Ok(())
            });
        }

        // Bucket: probe first, create on NotFound; teardown empties it.
        let store = open_store(&config.object_store)?;
        let bucket = BucketFixture::provision(Arc::clone(&store), &config.object_store.bucket)?;
        events.record(FixtureEvent {
            phase: FixturePhase::Setup,
            resource: "bucket",
        });
        {
            let store: Arc<dyn BucketStore> = Arc::clone(&store);
            let name = config.object_store.bucket.clone();
            let events = Arc::clone(&events);
            teardown.push("bucket", move || {
                for key in store.list_keys(&name).map_err(|err| err.to_string())? {
                    store.delete_object(&name, &key).map_err(|err| err.to_string())?;
                }
                store.delete_bucket(&name).map_err(|err| err.to_string())?;
                events.record(FixtureEvent {
                    phase: FixturePhase::Teardown,
                    resource: "bucket",
                });
                Ok(())
            });
        }

        // Real tenant resolver; tests substitute through the registry.
        let registry = OverrideRegistry::new();
        let tenant = TenantContext::new(&config.tenant.name);
        let real: SharedTenantResolver =
            Arc::new(HeaderTenantResolver::new(tenant.clone(), &config.tenant.token));
        registry.register(TENANT_RESOLVER, Arc::new(real))?;

        Ok(Self {
            conn,
            schema,
            bucket,
            registry,
            teardown,
            events,
            tenant,
            token: config.tenant.token.clone(),
        })
    }

    /// Merges a seed batch by primary key and commits once.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when validation or a statement fails.
    pub fn seed(&self, batch: &SeedBatch) -> Result<(), HarnessError> {
        let mut guard =
            self.conn.lock().map_err(|_| HarnessError::Db("connection lock poisoned".to_string()))?;
        seed(&mut guard, &self.schema, batch)?;
        Ok(())
    }

    /// Writes an object into the fixture bucket, overwriting any prior body.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Bucket`] on backend failure.
    pub fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), HarnessError> {
        self.bucket.put_object(key, body)?;
        Ok(())
    }

    /// Returns the provisioned schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the shared connection handle.
    #[must_use]
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    /// Returns the provisioned bucket handle.
    #[must_use]
    pub const fn bucket(&self) -> &BucketFixture {
        &self.bucket
    }

    /// Returns the dependency registry.
    #[must_use]
    pub const fn registry(&self) -> &OverrideRegistry {
        &self.registry
    }

    /// Returns the tenant the real resolver grants.
    #[must_use]
    pub const fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Returns the token the real resolver accepts.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Substitutes a fixed tenant for the scope of the returned guard.
    ///
    /// Dropping the guard restores the real header resolver, on every exit
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when the registry is unavailable.
    pub fn override_tenant(&self, name: &str) -> Result<OverrideGuard, HarnessError> {
        let substitute: SharedTenantResolver =
            Arc::new(StaticTenantResolver::new(TenantContext::new(name)));
        let guard = self.registry.override_with(TENANT_RESOLVER, Arc::new(substitute))?;
        self.events.record(FixtureEvent {
            phase: FixturePhase::Setup,
            resource: "override",
        });
        Ok(guard)
    }

    /// Wraps a router into an in-process client wired to this harness.
    ///
    /// The harness registry rides along as an extension, so handlers resolve
    /// the tenant through whichever resolver is currently installed.
    #[must_use]
    pub fn client(&self, router: Router) -> TestClient {
        TestClient::new(router.layer(Extension(self.registry.clone())))
    }

    /// Runs teardown now, surfacing any failures.
    ///
    /// A harness that is instead dropped still tears down, but failures on
    /// that path have no caller to report to.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Teardown`] listing every failed action.
    pub fn finish(mut self) -> Result<(), HarnessError> {
        self.teardown.run()?;
        Ok(())
    }
}
