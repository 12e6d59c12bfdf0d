// crates/testbed-object-store/src/fixture.rs
// ============================================================================
// Module: Bucket Fixture
// Description: Scoped bucket provisioning with ordered teardown.
// Purpose: Probe-then-create buckets, seed objects, and tear down
//          objects-before-bucket.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`BucketFixture`] wraps a [`BucketStore`] with the provisioning discipline
//! fixtures need: probe with `head_bucket` first and create only on
//! `NotFound` (a blind create on an existing bucket fails with
//! `AlreadyExists`), seed objects by unconditional overwrite, and tear down
//! by deleting every object before the bucket itself.
//!
//! ## Invariants
//! - Teardown deletes objects before the bucket (most backends refuse to
//!   delete a non-empty bucket).
//! - Teardown of a fixture that adopted a pre-existing bucket still empties
//!   and deletes it, mirroring the state the provisioner guarantees on the
//!   next setup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::store::BucketStore;
use crate::store::BucketStoreError;

// ============================================================================
// SECTION: Bucket Fixture
// ============================================================================

/// A provisioned bucket scoped to one fixture.
pub struct BucketFixture {
    /// Backing store.
    store: Arc<dyn BucketStore>,
    /// Provisioned bucket name.
    bucket: String,
}

impl std::fmt::Debug for BucketFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketFixture").field("bucket", &self.bucket).finish_non_exhaustive()
    }
}

impl BucketFixture {
    /// Ensures the bucket exists: head first, create only on `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] on probe or create failure.
    pub fn provision(store: Arc<dyn BucketStore>, bucket: &str) -> Result<Self, BucketStoreError> {
        match store.head_bucket(bucket) {
            Ok(()) => {}
            Err(BucketStoreError::NotFound {
                ..
            }) => store.create_bucket(bucket)?,
            Err(err) => return Err(err),
        }
        Ok(Self {
            store,
            bucket: bucket.to_string(),
        })
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn BucketStore> {
        Arc::clone(&self.store)
    }

    /// Writes an object body, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] on backend failure.
    pub fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), BucketStoreError> {
        self.store.put_object(&self.bucket, key, body)
    }

    /// Writes a JSON document as an object body.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] on serialization or backend failure.
    pub fn put_json(&self, key: &str, value: &JsonValue) -> Result<(), BucketStoreError> {
        let body =
            serde_json::to_vec(value).map_err(|err| BucketStoreError::Io(err.to_string()))?;
        self.put_object(key, body)
    }

    /// Reads an object's full body.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError::NoSuchKey`] when absent.
    pub fn get_object(&self, key: &str) -> Result<Vec<u8>, BucketStoreError> {
        self.store.get_object(&self.bucket, key)
    }

    /// Lists all keys in the bucket, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] on backend failure.
    pub fn list_keys(&self) -> Result<Vec<String>, BucketStoreError> {
        self.store.list_keys(&self.bucket)
    }

    /// Tears the bucket down: delete every object, then the bucket.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] when any deletion fails; a failure leaves
    /// the remaining state in place for the caller to report.
    pub fn teardown(self) -> Result<(), BucketStoreError> {
        for key in self.store.list_keys(&self.bucket)? {
            self.store.delete_object(&self.bucket, &key)?;
        }
        self.store.delete_bucket(&self.bucket)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::BucketFixture;
    use crate::store::BucketStore;
    use crate::store::BucketStoreError;
    use crate::store::MemoryBucketStore;

    /// Test result alias keeping assertions unwrap-free.
    type TestResult = Result<(), String>;

    /// Stringifies store errors for the test result alias.
    fn fail(err: BucketStoreError) -> String {
        err.to_string()
    }

    #[test]
    fn provision_creates_only_when_missing() -> TestResult {
        let store: Arc<dyn BucketStore> = Arc::new(MemoryBucketStore::new());
        let first = BucketFixture::provision(Arc::clone(&store), "tenant-x").map_err(fail)?;
        // Second provision adopts the existing bucket instead of failing.
        let second = BucketFixture::provision(Arc::clone(&store), "tenant-x").map_err(fail)?;
        drop(first);
        second.teardown().map_err(fail)?;
        assert!(matches!(
            store.head_bucket("tenant-x"),
            Err(BucketStoreError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn json_round_trip_is_byte_identical() -> TestResult {
        let store: Arc<dyn BucketStore> = Arc::new(MemoryBucketStore::new());
        let fixture = BucketFixture::provision(store, "tenant-x").map_err(fail)?;
        fixture.put_json("a.json", &json!({"v": 1})).map_err(fail)?;
        let body = fixture.get_object("a.json").map_err(fail)?;
        assert_eq!(body, br#"{"v":1}"#.to_vec());
        Ok(())
    }

    #[test]
    fn teardown_deletes_objects_before_bucket() -> TestResult {
        let store: Arc<dyn BucketStore> = Arc::new(MemoryBucketStore::new());
        let fixture = BucketFixture::provision(Arc::clone(&store), "tenant-x").map_err(fail)?;
        fixture
            .put_object("basements/base_1/training_script.py", b"print('fit')".to_vec())
            .map_err(fail)?;
        fixture
            .put_object("basements/base_1/training_archive.zip", vec![0x50, 0x4b])
            .map_err(fail)?;
        fixture.teardown().map_err(fail)?;
        assert!(matches!(
            store.head_bucket("tenant-x"),
            Err(BucketStoreError::NotFound { .. })
        ));
        Ok(())
    }
}
