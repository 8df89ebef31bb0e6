//! In-memory object store with deterministic fault injection.
//!
//! This is the test collaborator for the whole workspace: all data lives in
//! memory, listings are naturally sorted, and faults are injected from a
//! seeded hash so every run of a scenario behaves identically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use strata_core::{Clock, SystemClock};

use crate::error::{StoreError, StoreResult};
use crate::meta::{CopyOptions, GetOptions, ListOptions, Object, ObjectMeta, Page};
use crate::store::ObjectStore;

/// Default page size for listings when the caller does not cap them.
const LIST_PAGE_DEFAULT: usize = 1000;

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in the in-memory store.
///
/// Rates are probabilities in `0.0..=1.0`, drawn deterministically from the
/// store's seed. Force flags are one-shot: they trip the next matching
/// operation and clear themselves.
#[derive(Debug, Clone, Default)]
pub struct StoreFaultConfig {
    /// Probability of a put failing with an I/O error.
    pub put_fail_rate: f64,
    /// Probability of a get failing with an I/O error.
    pub get_fail_rate: f64,
    /// Probability of any operation failing as `ServiceUnavailable`.
    pub unavailable_rate: f64,
    /// If true, the next put fails (one-shot).
    pub force_put_fail: bool,
    /// If true, the next get fails (one-shot).
    pub force_get_fail: bool,
    /// If true, the next operation fails as `ServiceUnavailable` (one-shot).
    pub force_unavailable: bool,
}

impl StoreFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the put failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_put_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.put_fail_rate = rate;
        self
    }

    /// Sets the get failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_get_fail_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.get_fail_rate = rate;
        self
    }

    /// Forces the next put to fail (one-shot).
    #[must_use]
    pub const fn with_force_put_fail(mut self) -> Self {
        self.force_put_fail = true;
        self
    }

    /// Forces the next operation to fail as unavailable (one-shot).
    #[must_use]
    pub const fn with_force_unavailable(mut self) -> Self {
        self.force_unavailable = true;
        self
    }
}

// -----------------------------------------------------------------------------
// MemoryStore
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredObject {
    payload: Bytes,
    meta: ObjectMeta,
}

/// In-memory store for deterministic testing.
///
/// # Determinism
///
/// Fault injection hashes the seed with an operation counter, so the same
/// seed and operation sequence produce the same faults.
///
/// # Cloning
///
/// Clones share the underlying object map (via `Arc`), so multiple handles
/// observe and modify the same state.
pub struct MemoryStore {
    id: String,
    containers: Arc<Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>>,
    fault_config: Arc<Mutex<StoreFaultConfig>>,
    clock: Arc<dyn Clock>,
    seed: u64,
    counter: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("id", &self.id)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates a store named "memory" on the wall clock.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::named("memory", seed, Arc::new(SystemClock))
    }

    /// Creates a store with an explicit id and clock.
    ///
    /// Tests give the near and far tiers distinct ids so link records can be
    /// told apart, and share a manual clock with the engine so object ages
    /// advance deterministically.
    #[must_use]
    pub fn named(id: impl Into<String>, seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            id: id.into(),
            containers: Arc::new(Mutex::new(BTreeMap::new())),
            fault_config: Arc::new(Mutex::new(StoreFaultConfig::default())),
            clock,
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a store with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: StoreFaultConfig) -> Self {
        let store = Self::new(seed);
        *store.fault_config.lock().expect("fault config lock poisoned") = config;
        store
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, StoreFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Number of objects in a container, for test inspection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn object_count(&self, container: &str) -> usize {
        let containers = self.containers.lock().expect("containers lock poisoned");
        containers.get(container).map_or(0, BTreeMap::len)
    }

    /// Raw (unscrubbed) metadata for test inspection, bypassing faults.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn raw_meta(&self, container: &str, name: &str) -> Option<ObjectMeta> {
        let containers = self.containers.lock().expect("containers lock poisoned");
        containers
            .get(container)
            .and_then(|c| c.get(name))
            .map(|o| o.meta.clone())
    }

    /// Deterministic fault draw based on seed and counter.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self.seed.wrapping_add(counter).wrapping_mul(0x5851_f42d_4c95_7f2d);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    /// Trips the shared transient fault, if armed.
    fn check_available(&self, operation: &'static str) -> StoreResult<()> {
        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_unavailable {
            config.force_unavailable = false;
            return Err(StoreError::ServiceUnavailable { operation });
        }
        let rate = config.unavailable_rate;
        drop(config);

        if self.should_inject_fault(rate) {
            return Err(StoreError::ServiceUnavailable { operation });
        }
        Ok(())
    }

    fn stamp(&self, name: &str, payload: &Bytes, user_metadata: BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: name.to_string(),
            etag: format!("{:x}", md5::compute(payload)),
            size: payload.len() as u64,
            last_modified: self.clock.now(),
            user_metadata,
        }
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            containers: self.containers.clone(),
            fault_config: self.fault_config.clone(),
            clock: self.clock.clone(),
            seed: self.seed,
            counter: self.counter.clone(),
        }
    }
}

#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl ObjectStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn preserves_raw_names(&self) -> bool {
        true
    }

    async fn get(
        &self,
        container: &str,
        name: &str,
        _options: &GetOptions,
    ) -> StoreResult<Option<Object>> {
        assert!(!name.is_empty(), "object name must not be empty");
        self.check_available("get")?;

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_get_fail {
            config.force_get_fail = false;
            drop(config);
            return Err(StoreError::Io {
                operation: "get",
                message: "injected get failure (forced)".to_string(),
            });
        }
        let get_fail_rate = config.get_fail_rate;
        drop(config);

        if self.should_inject_fault(get_fail_rate) {
            return Err(StoreError::Io {
                operation: "get",
                message: "injected get failure (random)".to_string(),
            });
        }

        let containers = self.containers.lock().expect("containers lock poisoned");
        Ok(containers.get(container).and_then(|c| c.get(name)).map(|o| Object {
            meta: o.meta.clone(),
            payload: o.payload.clone(),
        }))
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
        user_metadata: BTreeMap<String, String>,
    ) -> StoreResult<String> {
        assert!(!name.is_empty(), "object name must not be empty");
        self.check_available("put")?;

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_put_fail {
            config.force_put_fail = false;
            drop(config);
            return Err(StoreError::Io {
                operation: "put",
                message: "injected put failure (forced)".to_string(),
            });
        }
        let put_fail_rate = config.put_fail_rate;
        drop(config);

        if self.should_inject_fault(put_fail_rate) {
            return Err(StoreError::Io {
                operation: "put",
                message: "injected put failure (random)".to_string(),
            });
        }

        let meta = self.stamp(name, &payload, user_metadata);
        let etag = meta.etag.clone();

        let mut containers = self.containers.lock().expect("containers lock poisoned");
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound {
                container: container.to_string(),
            })?;
        objects.insert(name.to_string(), StoredObject { payload, meta });

        assert!(objects.contains_key(name), "object must exist after put");
        Ok(etag)
    }

    async fn delete(&self, container: &str, name: &str) -> StoreResult<()> {
        assert!(!name.is_empty(), "object name must not be empty");
        self.check_available("delete")?;

        let mut containers = self.containers.lock().expect("containers lock poisoned");
        if let Some(objects) = containers.get_mut(container) {
            objects.remove(name);
            assert!(!objects.contains_key(name), "object must not exist after delete");
        }
        Ok(())
    }

    async fn exists(&self, container: &str, name: &str) -> StoreResult<bool> {
        self.check_available("exists")?;
        let containers = self.containers.lock().expect("containers lock poisoned");
        Ok(containers.get(container).is_some_and(|c| c.contains_key(name)))
    }

    async fn copy(
        &self,
        from_container: &str,
        from_name: &str,
        to_container: &str,
        to_name: &str,
        options: &CopyOptions,
    ) -> StoreResult<String> {
        self.check_available("copy")?;

        let mut containers = self.containers.lock().expect("containers lock poisoned");
        let source = containers
            .get(from_container)
            .and_then(|c| c.get(from_name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: from_container.to_string(),
                name: from_name.to_string(),
            })?;

        let user_metadata = options
            .user_metadata
            .clone()
            .unwrap_or_else(|| source.meta.user_metadata.clone());
        let meta = self.stamp(to_name, &source.payload, user_metadata);
        let etag = meta.etag.clone();

        let objects = containers
            .get_mut(to_container)
            .ok_or_else(|| StoreError::ContainerNotFound {
                container: to_container.to_string(),
            })?;
        objects.insert(
            to_name.to_string(),
            StoredObject {
                payload: source.payload,
                meta,
            },
        );
        Ok(etag)
    }

    async fn metadata(&self, container: &str, name: &str) -> StoreResult<Option<ObjectMeta>> {
        self.check_available("metadata")?;
        let containers = self.containers.lock().expect("containers lock poisoned");
        Ok(containers
            .get(container)
            .and_then(|c| c.get(name))
            .map(|o| o.meta.clone()))
    }

    async fn list(&self, container: &str, options: &ListOptions) -> StoreResult<Page> {
        self.check_available("list")?;

        let containers = self.containers.lock().expect("containers lock poisoned");
        let objects = containers
            .get(container)
            .ok_or_else(|| StoreError::ContainerNotFound {
                container: container.to_string(),
            })?;

        let max = options
            .max_results
            .map_or(LIST_PAGE_DEFAULT, |m| m as usize);
        let mut entries = Vec::with_capacity(max.min(objects.len()));
        let mut truncated = false;

        for (name, object) in objects {
            if let Some(after) = &options.start_after {
                if name.as_str() <= after.as_str() {
                    continue;
                }
            }
            if let Some(prefix) = &options.prefix {
                if !name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if entries.len() == max {
                truncated = true;
                break;
            }
            entries.push(object.meta.clone());
        }

        // Postcondition: page is sorted and within the cap.
        assert!(entries.len() <= max, "page exceeds cap");
        assert!(
            entries.windows(2).all(|w| w[0].name < w[1].name),
            "page must be sorted by name"
        );

        let next = if truncated {
            entries.last().map(|m| m.name.clone())
        } else {
            None
        };
        Ok(Page { entries, next })
    }

    async fn create_container(&self, container: &str) -> StoreResult<bool> {
        assert!(!container.is_empty(), "container must not be empty");
        self.check_available("create_container")?;

        let mut containers = self.containers.lock().expect("containers lock poisoned");
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn delete_container_if_empty(&self, container: &str) -> StoreResult<bool> {
        self.check_available("delete_container")?;

        let mut containers = self.containers.lock().expect("containers lock poisoned");
        match containers.get(container) {
            Some(objects) if objects.is_empty() => {
                containers.remove(container);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_container() -> MemoryStore {
        let store = MemoryStore::new(42);
        store.create_container("c").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let store = store_with_container().await;

        assert!(!store.exists("c", "a").await.unwrap());

        let etag = store
            .put("c", "a", Bytes::from("payload"), BTreeMap::new())
            .await
            .unwrap();
        assert!(store.exists("c", "a").await.unwrap());

        let object = store.get("c", "a", &GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(object.payload, Bytes::from("payload"));
        assert_eq!(object.meta.etag, etag);
        assert_eq!(object.meta.size, 7);

        store.delete("c", "a").await.unwrap();
        assert!(!store.exists("c", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_payload_allowed() {
        let store = store_with_container().await;
        store
            .put("c", "marker", Bytes::new(), BTreeMap::new())
            .await
            .unwrap();
        let meta = store.metadata("c", "marker").await.unwrap().unwrap();
        assert_eq!(meta.size, 0);
    }

    #[tokio::test]
    async fn test_put_missing_container() {
        let store = MemoryStore::new(42);
        let result = store.put("nope", "a", Bytes::from("x"), BTreeMap::new()).await;
        assert!(matches!(result, Err(StoreError::ContainerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_copy_replaces_metadata_wholesale() {
        let store = store_with_container().await;
        let mut meta = BTreeMap::new();
        meta.insert("color".to_string(), "red".to_string());
        store.put("c", "a", Bytes::from("x"), meta).await.unwrap();

        let mut replacement = BTreeMap::new();
        replacement.insert("color".to_string(), "blue".to_string());
        store
            .copy(
                "c",
                "a",
                "c",
                "a",
                &CopyOptions {
                    user_metadata: Some(replacement),
                },
            )
            .await
            .unwrap();

        let meta = store.metadata("c", "a").await.unwrap().unwrap();
        assert_eq!(meta.user_metadata.get("color").unwrap(), "blue");
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let store = store_with_container().await;
        let result = store.copy("c", "ghost", "c", "b", &CopyOptions::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = store_with_container().await;
        for name in ["a", "b", "c", "d", "e"] {
            store.put("c", name, Bytes::from("x"), BTreeMap::new()).await.unwrap();
        }

        let page = store
            .list(
                "c",
                &ListOptions {
                    max_results: Some(2),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.next.as_deref(), Some("b"));

        let page = store
            .list(
                "c",
                &ListOptions {
                    max_results: Some(10),
                    start_after: Some("b".to_string()),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = page.entries.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["c", "d", "e"]);
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_forced_put_failure_is_one_shot() {
        let store = store_with_container().await;
        store.fault_config().force_put_fail = true;

        let result = store.put("c", "a", Bytes::from("x"), BTreeMap::new()).await;
        assert!(matches!(result, Err(StoreError::Io { .. })));

        let result = store.put("c", "a", Bytes::from("x"), BTreeMap::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_forced_unavailable_is_one_shot() {
        let store = store_with_container().await;
        store.fault_config().force_unavailable = true;

        let result = store.metadata("c", "a").await;
        assert!(matches!(result, Err(StoreError::ServiceUnavailable { .. })));
        assert!(result.unwrap_err().is_transient());

        assert!(store.metadata("c", "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store = store_with_container().await;
        store.put("c", "a", Bytes::from("x"), BTreeMap::new()).await.unwrap();

        let clone = store.clone();
        assert!(clone.exists("c", "a").await.unwrap());
        clone.delete("c", "a").await.unwrap();
        assert!(!store.exists("c", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_deterministic_faults() {
        let config = StoreFaultConfig::none().with_put_fail_rate(0.5);
        let store1 = MemoryStore::with_faults(12345, config.clone());
        let store2 = MemoryStore::with_faults(12345, config);
        store1.create_container("c").await.unwrap();
        store2.create_container("c").await.unwrap();

        let mut results1 = Vec::new();
        let mut results2 = Vec::new();
        for _ in 0..10 {
            results1.push(store1.put("c", "a", Bytes::from("x"), BTreeMap::new()).await.is_ok());
            results2.push(store2.put("c", "a", Bytes::from("x"), BTreeMap::new()).await.is_ok());
        }
        assert_eq!(results1, results2);
    }
}
