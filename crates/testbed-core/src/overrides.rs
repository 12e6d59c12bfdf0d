// crates/testbed-core/src/overrides.rs
// ============================================================================
// Module: Dependency Overrides
// Description: Stack-scoped substitution map for test dependency injection.
// Purpose: Swap a real provider for a stand-in during one test's scope, with
//          guaranteed restoration on all exit paths.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! An [`OverrideRegistry`] maps dependency keys to providers. Tests install a
//! substitute with [`OverrideRegistry::override_with`], which returns an
//! [`OverrideGuard`]; dropping the guard removes the substitute and the
//! previous provider becomes visible again. Because removal keys on the
//! guard's own entry, guards dropped out of order still restore correctly.
//!
//! ## Invariants
//! - Resolution returns the most recently installed live provider.
//! - An override is never visible after its guard drops, including on panic.
//! - Overrides installed under one guard are invisible to scopes that did
//!   not install them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Dependency resolution errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverrideError {
    /// No provider registered under the key.
    #[error("no provider registered for dependency {key:?}")]
    Unregistered {
        /// Requested dependency key.
        key: &'static str,
    },
    /// The live provider is not of the requested type.
    #[error("provider for dependency {key:?} has an unexpected type")]
    WrongType {
        /// Requested dependency key.
        key: &'static str,
    },
    /// The registry mutex was poisoned by a panicking holder.
    #[error("override registry lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// A type-erased provider entry with a unique id for targeted removal.
struct Entry {
    /// Monotonic id identifying this installation.
    id: u64,
    /// The provider itself.
    provider: Arc<dyn Any + Send + Sync>,
}

/// Keyed provider map; the last live entry per key wins.
type ProviderMap = HashMap<&'static str, Vec<Entry>>;

/// Dependency registry with stack-scoped overrides.
#[derive(Clone, Default)]
pub struct OverrideRegistry {
    /// Shared provider map.
    inner: Arc<Mutex<ProviderMap>>,
    /// Source of installation ids.
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for OverrideRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideRegistry").finish_non_exhaustive()
    }
}

impl OverrideRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the base (real) provider for a dependency key.
    ///
    /// Registering again replaces the base provider but leaves live
    /// overrides untouched.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Poisoned`] when the registry lock is poisoned.
    pub fn register<T>(&self, key: &'static str, provider: Arc<T>) -> Result<(), OverrideError>
    where
        T: Any + Send + Sync,
    {
        let mut map = self.inner.lock().map_err(|_| OverrideError::Poisoned)?;
        let entries = map.entry(key).or_default();
        let entry = Entry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            provider,
        };
        if entries.is_empty() {
            entries.push(entry);
        } else {
            entries[0] = entry;
        }
        Ok(())
    }

    /// Installs a substitute provider, returning a guard that removes it.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Poisoned`] when the registry lock is poisoned.
    pub fn override_with<T>(
        &self,
        key: &'static str,
        substitute: Arc<T>,
    ) -> Result<OverrideGuard, OverrideError>
    where
        T: Any + Send + Sync,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.inner.lock().map_err(|_| OverrideError::Poisoned)?;
        map.entry(key).or_default().push(Entry {
            id,
            provider: substitute,
        });
        Ok(OverrideGuard {
            registry: Arc::clone(&self.inner),
            key,
            id,
        })
    }

    /// Resolves the current provider for a key, downcast to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Unregistered`] when nothing is installed,
    /// [`OverrideError::WrongType`] on a type mismatch, or
    /// [`OverrideError::Poisoned`] when the registry lock is poisoned.
    pub fn resolve<T>(&self, key: &'static str) -> Result<Arc<T>, OverrideError>
    where
        T: Any + Send + Sync,
    {
        let map = self.inner.lock().map_err(|_| OverrideError::Poisoned)?;
        let provider = map
            .get(key)
            .and_then(|entries| entries.last())
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or(OverrideError::Unregistered {
                key,
            })?;
        provider.downcast::<T>().map_err(|_| OverrideError::WrongType {
            key,
        })
    }

    /// Returns whether any override (beyond the base provider) is live.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Poisoned`] when the registry lock is poisoned.
    pub fn has_override(&self, key: &'static str) -> Result<bool, OverrideError> {
        let map = self.inner.lock().map_err(|_| OverrideError::Poisoned)?;
        Ok(map.get(key).is_some_and(|entries| entries.len() > 1))
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Removes its override entry when dropped.
///
/// Removal is best-effort when the registry lock is poisoned: the entry
/// stays in the map, but it is never served — [`OverrideRegistry::resolve`]
/// reports [`OverrideError::Poisoned`] for every lookup from that point on.
///
/// # Invariants
/// - Removal targets this guard's entry only; unrelated overrides survive.
#[must_use = "dropping the guard immediately removes the override"]
pub struct OverrideGuard {
    /// Registry the override lives in.
    registry: Arc<Mutex<ProviderMap>>,
    /// Dependency key the override was installed under.
    key: &'static str,
    /// Installation id to remove.
    id: u64,
}

impl std::fmt::Debug for OverrideGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideGuard").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.registry.lock() {
            if let Some(entries) = map.get_mut(self.key) {
                entries.retain(|entry| entry.id != self.id);
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::OverrideError;
    use super::OverrideRegistry;

    /// Test result alias keeping assertions unwrap-free.
    type TestResult = Result<(), OverrideError>;

    /// Marker dependency key used across tests.
    const TENANT: &str = "tenant";

    #[test]
    fn resolve_returns_registered_provider() -> TestResult {
        let registry = OverrideRegistry::new();
        registry.register(TENANT, Arc::new("real".to_string()))?;
        let provider = registry.resolve::<String>(TENANT)?;
        assert_eq!(provider.as_str(), "real");
        Ok(())
    }

    #[test]
    fn override_wins_while_guard_lives() -> TestResult {
        let registry = OverrideRegistry::new();
        registry.register(TENANT, Arc::new("real".to_string()))?;
        let guard = registry.override_with(TENANT, Arc::new("substitute".to_string()))?;
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "substitute");
        drop(guard);
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "real");
        Ok(())
    }

    #[test]
    fn override_does_not_leak_into_next_scope() -> TestResult {
        let registry = OverrideRegistry::new();
        registry.register(TENANT, Arc::new("real".to_string()))?;
        {
            let _guard = registry.override_with(TENANT, Arc::new("scoped".to_string()))?;
        }
        assert!(!registry.has_override(TENANT)?);
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "real");
        Ok(())
    }

    #[test]
    fn nested_overrides_restore_lifo() -> TestResult {
        let registry = OverrideRegistry::new();
        registry.register(TENANT, Arc::new("real".to_string()))?;
        let outer = registry.override_with(TENANT, Arc::new("outer".to_string()))?;
        let inner = registry.override_with(TENANT, Arc::new("inner".to_string()))?;
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "inner");
        drop(inner);
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "outer");
        drop(outer);
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "real");
        Ok(())
    }

    #[test]
    fn out_of_order_drop_removes_only_its_entry() -> TestResult {
        let registry = OverrideRegistry::new();
        registry.register(TENANT, Arc::new("real".to_string()))?;
        let outer = registry.override_with(TENANT, Arc::new("outer".to_string()))?;
        let inner = registry.override_with(TENANT, Arc::new("inner".to_string()))?;
        drop(outer);
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "inner");
        drop(inner);
        assert_eq!(registry.resolve::<String>(TENANT)?.as_str(), "real");
        Ok(())
    }

    #[test]
    fn unregistered_and_mistyped_lookups_fail() -> TestResult {
        let registry = OverrideRegistry::new();
        assert!(matches!(
            registry.resolve::<String>(TENANT),
            Err(OverrideError::Unregistered { .. })
        ));
        registry.register(TENANT, Arc::new(7_u32))?;
        assert!(matches!(
            registry.resolve::<String>(TENANT),
            Err(OverrideError::WrongType { .. })
        ));
        Ok(())
    }
}
