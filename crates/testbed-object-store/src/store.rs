// crates/testbed-object-store/src/store.rs
// ============================================================================
// Module: Bucket Store Backends
// Description: Bucket-scoped blob operations over memory or S3.
// Purpose: Give fixtures an isolated key/value namespace with discriminated
//          errors for provisioning decisions.
// Dependencies: aws-config, aws-sdk-s3, tokio, thiserror
// ============================================================================

//! ## Overview
//! [`BucketStore`] is the seam between fixture provisioning and storage:
//! bucket create/head/delete plus object put/get/delete/list. Two backends
//! implement it:
//!
//! - [`MemoryBucketStore`] — a mutex-guarded in-memory map, the mock used by
//!   unit and integration suites; all state discards wholesale when the
//!   value drops.
//! - [`S3BucketStore`] — an S3-compatible endpoint via `aws-sdk-s3`, driven
//!   synchronously on an owned runtime so fixtures stay single-threaded.
//!
//! ## Invariants
//! - `create_bucket` on an existing bucket fails with `AlreadyExists`;
//!   callers probe with `head_bucket` and create only on `NotFound`.
//! - `put_object` is an unconditional overwrite.
//! - `delete_bucket` on a non-empty bucket fails with `NotEmpty`; teardown
//!   deletes objects first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::runtime::RuntimeFlavor;

use crate::config::ObjectStoreConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bucket store errors, discriminated for provisioning decisions.
#[derive(Debug, Error)]
pub enum BucketStoreError {
    /// Bucket does not exist.
    #[error("bucket not found: {bucket}")]
    NotFound {
        /// Requested bucket.
        bucket: String,
    },
    /// Bucket already exists.
    #[error("bucket already exists: {bucket}")]
    AlreadyExists {
        /// Requested bucket.
        bucket: String,
    },
    /// Bucket still contains objects.
    #[error("bucket not empty: {bucket}")]
    NotEmpty {
        /// Requested bucket.
        bucket: String,
    },
    /// Object does not exist.
    #[error("no such key: {bucket}/{key}")]
    NoSuchKey {
        /// Bucket holding the namespace.
        bucket: String,
        /// Requested key.
        key: String,
    },
    /// Invalid input (bucket name, key, configuration).
    #[error("bucket store invalid: {0}")]
    Invalid(String),
    /// Backend returned an error.
    #[error("bucket store backend error: {0}")]
    Backend(String),
    /// Local I/O or runtime failure.
    #[error("bucket store io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Store Seam
// ============================================================================

/// Bucket-scoped blob operations used by fixtures.
pub trait BucketStore: Send + Sync {
    /// Creates a bucket; fails with `AlreadyExists` when present.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] on conflict or backend failure.
    fn create_bucket(&self, bucket: &str) -> Result<(), BucketStoreError>;

    /// Probes bucket existence; `NotFound` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] when absent or on backend failure.
    fn head_bucket(&self, bucket: &str) -> Result<(), BucketStoreError>;

    /// Deletes an empty bucket; `NotEmpty` when objects remain.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] on residue, absence, or backend failure.
    fn delete_bucket(&self, bucket: &str) -> Result<(), BucketStoreError>;

    /// Writes an object, overwriting any previous body.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] when the bucket is absent or the backend
    /// fails.
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BucketStoreError>;

    /// Reads an object's full body.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError::NoSuchKey`] when absent.
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BucketStoreError>;

    /// Deletes an object; deleting an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] when the bucket is absent or the backend
    /// fails.
    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BucketStoreError>;

    /// Lists all keys in the bucket, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError`] when the bucket is absent or the backend
    /// fails.
    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, BucketStoreError>;
}

// ============================================================================
// SECTION: Memory Backend
// ============================================================================

/// Bucket contents: key to body.
type Objects = BTreeMap<String, Vec<u8>>;

/// In-memory mock store; the whole namespace discards when dropped.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    /// Buckets by name.
    buckets: Mutex<BTreeMap<String, Objects>>,
}

impl MemoryBucketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the bucket map, mapping poisoning onto an I/O error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Objects>>, BucketStoreError>
    {
        self.buckets.lock().map_err(|_| BucketStoreError::Io("bucket store lock poisoned".to_string()))
    }
}

impl BucketStore for MemoryBucketStore {
    fn create_bucket(&self, bucket: &str) -> Result<(), BucketStoreError> {
        if !crate::config::is_valid_bucket_name(bucket) {
            return Err(BucketStoreError::Invalid(format!("invalid bucket name: {bucket:?}")));
        }
        let mut buckets = self.lock()?;
        if buckets.contains_key(bucket) {
            return Err(BucketStoreError::AlreadyExists {
                bucket: bucket.to_string(),
            });
        }
        buckets.insert(bucket.to_string(), Objects::new());
        Ok(())
    }

    fn head_bucket(&self, bucket: &str) -> Result<(), BucketStoreError> {
        if self.lock()?.contains_key(bucket) {
            Ok(())
        } else {
            Err(BucketStoreError::NotFound {
                bucket: bucket.to_string(),
            })
        }
    }

    fn delete_bucket(&self, bucket: &str) -> Result<(), BucketStoreError> {
        let mut buckets = self.lock()?;
        let Some(objects) = buckets.get(bucket) else {
            return Err(BucketStoreError::NotFound {
                bucket: bucket.to_string(),
            });
        };
        if !objects.is_empty() {
            return Err(BucketStoreError::NotEmpty {
                bucket: bucket.to_string(),
            });
        }
        buckets.remove(bucket);
        Ok(())
    }

    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BucketStoreError> {
        let mut buckets = self.lock()?;
        let objects = buckets.get_mut(bucket).ok_or_else(|| BucketStoreError::NotFound {
            bucket: bucket.to_string(),
        })?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BucketStoreError> {
        let buckets = self.lock()?;
        let objects = buckets.get(bucket).ok_or_else(|| BucketStoreError::NotFound {
            bucket: bucket.to_string(),
        })?;
        objects.get(key).cloned().ok_or_else(|| BucketStoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BucketStoreError> {
        let mut buckets = self.lock()?;
        let objects = buckets.get_mut(bucket).ok_or_else(|| BucketStoreError::NotFound {
            bucket: bucket.to_string(),
        })?;
        objects.remove(key);
        Ok(())
    }

    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, BucketStoreError> {
        let buckets = self.lock()?;
        let objects = buckets.get(bucket).ok_or_else(|| BucketStoreError::NotFound {
            bucket: bucket.to_string(),
        })?;
        Ok(objects.keys().cloned().collect())
    }
}

// ============================================================================
// SECTION: Runtime Helper
// ============================================================================

/// Blocks on an S3 future using a compatible runtime.
///
/// Inside a multi-thread tokio runtime the call parks via `block_in_place`;
/// inside a current-thread runtime it runs on a disposable runtime on a
/// helper thread; otherwise it blocks the owned runtime directly.
fn block_on_with_runtime<F, T>(runtime: &Runtime, future: F) -> Result<T, BucketStoreError>
where
    F: Future<Output = Result<T, BucketStoreError>> + Send + 'static,
    T: Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) {
            return tokio::task::block_in_place(|| handle.block_on(future));
        }
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        std::thread::spawn(move || {
            let result = Runtime::new()
                .map_err(|err| BucketStoreError::Io(err.to_string()))
                .and_then(|runtime| runtime.block_on(future));
            let _ = tx.send(result);
        });
        return rx
            .recv()
            .unwrap_or_else(|_| Err(BucketStoreError::Io("bucket store thread join failed".to_string())));
    }

    runtime.block_on(future)
}

// ============================================================================
// SECTION: S3 Backend
// ============================================================================

/// S3-compatible backend driven synchronously on an owned runtime.
pub struct S3BucketStore {
    /// Underlying S3 client.
    client: Client,
    /// Tokio runtime for blocking S3 operations.
    runtime: Runtime,
}

impl std::fmt::Debug for S3BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BucketStore").finish_non_exhaustive()
    }
}

impl S3BucketStore {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BucketStoreError::Invalid`] on bad configuration and
    /// [`BucketStoreError::Io`] when the runtime cannot start.
    pub fn connect(config: &ObjectStoreConfig) -> Result<Self, BucketStoreError> {
        config.validate().map_err(|err| BucketStoreError::Invalid(err.to_string()))?;
        let runtime = Runtime::new().map_err(|err| BucketStoreError::Io(err.to_string()))?;
        let region = config.region.clone();
        let endpoint = config.endpoint.clone();
        let credentials = match (config.access_key.clone(), config.secret_key.clone()) {
            (Some(access_key), Some(secret_key)) => Some((access_key, secret_key)),
            _ => None,
        };
        let shared_config = block_on_with_runtime(&runtime, async move {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region));
            }
            if let Some(endpoint) = endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            if let Some((access_key, secret_key)) = credentials {
                loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                    access_key, secret_key, None, None, "testbed",
                ));
            }
            Ok(loader.load().await)
        })?;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
        })
    }
}

impl BucketStore for S3BucketStore {
    fn create_bucket(&self, bucket: &str) -> Result<(), BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        block_on_with_runtime(&self.runtime, async move {
            match client.create_bucket().bucket(name.clone()).send().await {
                Ok(_) => Ok(()),
                Err(err) => {
                    let service = err.into_service_error();
                    if service.is_bucket_already_exists()
                        || service.is_bucket_already_owned_by_you()
                    {
                        Err(BucketStoreError::AlreadyExists {
                            bucket: name,
                        })
                    } else {
                        Err(BucketStoreError::Backend(service.to_string()))
                    }
                }
            }
        })
    }

    fn head_bucket(&self, bucket: &str) -> Result<(), BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        block_on_with_runtime(&self.runtime, async move {
            match client.head_bucket().bucket(name.clone()).send().await {
                Ok(_) => Ok(()),
                Err(err) => {
                    let service = err.into_service_error();
                    if service.is_not_found() {
                        Err(BucketStoreError::NotFound {
                            bucket: name,
                        })
                    } else {
                        Err(BucketStoreError::Backend(service.to_string()))
                    }
                }
            }
        })
    }

    fn delete_bucket(&self, bucket: &str) -> Result<(), BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        block_on_with_runtime(&self.runtime, async move {
            match client.delete_bucket().bucket(name.clone()).send().await {
                Ok(_) => Ok(()),
                Err(err) => {
                    let service = err.into_service_error();
                    match service.code() {
                        Some("BucketNotEmpty") => Err(BucketStoreError::NotEmpty {
                            bucket: name,
                        }),
                        Some("NoSuchBucket") => Err(BucketStoreError::NotFound {
                            bucket: name,
                        }),
                        _ => Err(BucketStoreError::Backend(service.to_string())),
                    }
                }
            }
        })
    }

    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        let key = key.to_string();
        block_on_with_runtime(&self.runtime, async move {
            client
                .put_object()
                .bucket(name)
                .key(key)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|err| BucketStoreError::Backend(err.into_service_error().to_string()))?;
            Ok(())
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        let key = key.to_string();
        block_on_with_runtime(&self.runtime, async move {
            let output = match client.get_object().bucket(name.clone()).key(key.clone()).send().await
            {
                Ok(output) => output,
                Err(err) => {
                    let service = err.into_service_error();
                    return if service.is_no_such_key() {
                        Err(BucketStoreError::NoSuchKey {
                            bucket: name,
                            key,
                        })
                    } else {
                        Err(BucketStoreError::Backend(service.to_string()))
                    };
                }
            };
            let collected = output
                .body
                .collect()
                .await
                .map_err(|err| BucketStoreError::Io(err.to_string()))?;
            Ok(collected.into_bytes().to_vec())
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        let key = key.to_string();
        block_on_with_runtime(&self.runtime, async move {
            client
                .delete_object()
                .bucket(name)
                .key(key)
                .send()
                .await
                .map_err(|err| BucketStoreError::Backend(err.into_service_error().to_string()))?;
            Ok(())
        })
    }

    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, BucketStoreError> {
        let client = self.client.clone();
        let name = bucket.to_string();
        block_on_with_runtime(&self.runtime, async move {
            let mut keys = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let mut request = client.list_objects_v2().bucket(name.clone());
                if let Some(token) = continuation.take() {
                    request = request.continuation_token(token);
                }
                let page = request.send().await.map_err(|err| {
                    BucketStoreError::Backend(err.into_service_error().to_string())
                })?;
                for object in page.contents() {
                    if let Some(key) = object.key() {
                        keys.push(key.to_string());
                    }
                }
                match page.next_continuation_token() {
                    Some(token) => continuation = Some(token.to_string()),
                    None => break,
                }
            }
            keys.sort();
            Ok(keys)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
