//! Forwarding store that logs every operation.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::StoreResult;
use crate::meta::{CopyOptions, GetOptions, ListOptions, Object, ObjectMeta, Page};
use crate::store::ObjectStore;

/// A decorator that forwards to an inner store and emits a structured log
/// line per operation, with the payload size and elapsed time where known.
///
/// Wrap either tier with this to watch gateway traffic per store.
#[derive(Debug, Clone)]
pub struct TracingStore<S> {
    inner: S,
}

impl<S: ObjectStore> TracingStore<S> {
    /// Wraps a store.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TracingStore<S> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn preserves_raw_names(&self) -> bool {
        self.inner.preserves_raw_names()
    }

    async fn get(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> StoreResult<Option<Object>> {
        let start = Instant::now();
        let result = self.inner.get(container, name, options).await;
        if let Ok(Some(object)) = &result {
            debug!(
                store = self.inner.id(),
                container,
                name,
                size = object.meta.size,
                elapsed_us = start.elapsed().as_micros() as u64,
                "get"
            );
        }
        result
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
        user_metadata: BTreeMap<String, String>,
    ) -> StoreResult<String> {
        let start = Instant::now();
        let size = payload.len() as u64;
        let result = self.inner.put(container, name, payload, user_metadata).await;
        debug!(
            store = self.inner.id(),
            container,
            name,
            size,
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "put"
        );
        result
    }

    async fn delete(&self, container: &str, name: &str) -> StoreResult<()> {
        let result = self.inner.delete(container, name).await;
        debug!(store = self.inner.id(), container, name, ok = result.is_ok(), "delete");
        result
    }

    async fn exists(&self, container: &str, name: &str) -> StoreResult<bool> {
        self.inner.exists(container, name).await
    }

    async fn copy(
        &self,
        from_container: &str,
        from_name: &str,
        to_container: &str,
        to_name: &str,
        options: &CopyOptions,
    ) -> StoreResult<String> {
        let start = Instant::now();
        let result = self
            .inner
            .copy(from_container, from_name, to_container, to_name, options)
            .await;
        debug!(
            store = self.inner.id(),
            from_container,
            from_name,
            to_container,
            to_name,
            ok = result.is_ok(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "copy"
        );
        result
    }

    async fn metadata(&self, container: &str, name: &str) -> StoreResult<Option<ObjectMeta>> {
        self.inner.metadata(container, name).await
    }

    async fn list(&self, container: &str, options: &ListOptions) -> StoreResult<Page> {
        let start = Instant::now();
        let result = self.inner.list(container, options).await;
        if let Ok(page) = &result {
            debug!(
                store = self.inner.id(),
                container,
                entries = page.entries.len(),
                truncated = page.next.is_some(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "list"
            );
        }
        result
    }

    async fn create_container(&self, container: &str) -> StoreResult<bool> {
        self.inner.create_container(container).await
    }

    async fn delete_container_if_empty(&self, container: &str) -> StoreResult<bool> {
        self.inner.delete_container_if_empty(container).await
    }
}
