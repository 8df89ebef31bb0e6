//! The object-store collaborator trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::meta::{CopyOptions, GetOptions, ListOptions, Object, ObjectMeta, Page};

/// A single storage tier.
///
/// The gateway engine is generic over this trait and holds exactly two
/// instances: the near (fast, client-facing) tier and the far (cheap,
/// backing) tier. Implementations must be `Send + Sync` for use across
/// async tasks.
///
/// # Semantics
///
/// - `get`/`metadata` return `Ok(None)` for a missing object or container
/// - `put`/`copy`/`list` fail with `ContainerNotFound` for a missing
///   container; `copy` fails with `NotFound` for a missing source object
/// - `delete` is idempotent and succeeds for missing objects
/// - listings are sorted by name and paginated
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// A stable identifier for this store instance, recorded in link
    /// records so a pointer names the tier it refers to.
    fn id(&self) -> &str;

    /// True when the store keeps object names byte-for-byte, with no
    /// escaping requirements of its own. Drives the marker-name encoding
    /// mode: verbatim stores get unescaped marker names.
    fn preserves_raw_names(&self) -> bool {
        false
    }

    /// Fetches an object's payload and metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails. A missing object is `Ok(None)`.
    async fn get(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> StoreResult<Option<Object>>;

    /// Writes an object, returning the stamped etag.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing or the write fails.
    async fn put(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
        user_metadata: BTreeMap<String, String>,
    ) -> StoreResult<String>;

    /// Deletes an object. Succeeds if the object is already absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    async fn delete(&self, container: &str, name: &str) -> StoreResult<()>;

    /// Checks whether an object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    async fn exists(&self, container: &str, name: &str) -> StoreResult<bool>;

    /// Server-side copy within the store, returning the destination etag.
    ///
    /// With `options.user_metadata` set, the destination's user metadata is
    /// replaced wholesale; source and destination may be the same name, which
    /// makes this a pure metadata update.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the source object is missing.
    async fn copy(
        &self,
        from_container: &str,
        from_name: &str,
        to_container: &str,
        to_name: &str,
        options: &CopyOptions,
    ) -> StoreResult<String>;

    /// Fetches an object's metadata without the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails. A missing object is `Ok(None)`.
    async fn metadata(&self, container: &str, name: &str) -> StoreResult<Option<ObjectMeta>>;

    /// Lists one sorted page of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is missing or the listing fails.
    async fn list(&self, container: &str, options: &ListOptions) -> StoreResult<Page>;

    /// Creates a container. Returns true if it did not already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    async fn create_container(&self, container: &str) -> StoreResult<bool>;

    /// Deletes a container if it holds no objects. Returns true on deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    async fn delete_container_if_empty(&self, container: &str) -> StoreResult<bool>;
}
