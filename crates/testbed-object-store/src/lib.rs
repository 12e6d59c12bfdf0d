// crates/testbed-object-store/src/lib.rs
// ============================================================================
// Module: Testbed Object Store
// Description: Bucket provisioning for fixtures, mock and S3-compatible.
// Purpose: Give tests an isolated blob namespace with ordered teardown.
// Dependencies: aws-config, aws-sdk-s3, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! The object-store half of the fixture lifecycle: a [`BucketStore`] seam
//! with an in-memory mock and an S3-compatible backend, a validated
//! [`config::ObjectStoreConfig`], and the [`BucketFixture`] provisioner that
//! probes before creating and deletes objects before the bucket on teardown.

use std::sync::Arc;

pub mod config;
mod fixture;
mod store;

pub use config::ConfigError;
pub use config::ObjectStoreConfig;
pub use config::ObjectStoreProvider;
pub use fixture::BucketFixture;
pub use store::BucketStore;
pub use store::BucketStoreError;
pub use store::MemoryBucketStore;
pub use store::S3BucketStore;

/// Builds a store from configuration: memory mock or S3 client.
///
/// # Errors
///
/// Returns [`BucketStoreError`] when the configuration is invalid or the S3
/// client cannot be constructed.
pub fn open_store(config: &ObjectStoreConfig) -> Result<Arc<dyn BucketStore>, BucketStoreError> {
    config.validate().map_err(|err| BucketStoreError::Invalid(err.to_string()))?;
    match config.provider {
        ObjectStoreProvider::Memory => Ok(Arc::new(MemoryBucketStore::new())),
        ObjectStoreProvider::S3 => Ok(Arc::new(S3BucketStore::connect(config)?)),
    }
}
