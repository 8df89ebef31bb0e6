//! The link codec.
//!
//! A link is the pointer record that replaces a migrated object's payload
//! at the near tier. It is an ordinary object whose metadata carries the
//! [`LINK_TAG`]; presence is signalled by that tag, never by payload
//! sniffing. The payload is a structured record with field order
//! irrelevant, so it survives any store that round-trips bytes.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strata_store::{ObjectMeta, ObjectStore};

use crate::error::{EngineError, EngineResult};

/// Prefix of metadata keys the gateway reserves for itself. Scrubbed from
/// everything handed back to clients.
pub const SYSTEM_METADATA_PREFIX: &str = "strata-sys-";

/// Metadata key marking an object as a link record.
pub const LINK_TAG: &str = "strata-sys-link";

// -----------------------------------------------------------------------------
// Link
// -----------------------------------------------------------------------------

/// An immutable pointer to a far-tier copy.
///
/// Invariant: if a near-tier entry is a link, the far tier holds a live
/// object matching this record; a link never coexists with a live payload
/// for the same name at near.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Link {
    /// Identity of the store holding the target.
    pub store_id: String,
    /// Target container.
    pub container: String,
    /// Target object name.
    pub name: String,
    /// Target content hash.
    pub etag: String,
    /// Target payload size in bytes.
    pub size: u64,
    /// Target last-modified instant, milliseconds since the Unix epoch.
    last_modified_ms: u64,
    /// User metadata preserved across migration.
    pub user_metadata: BTreeMap<String, String>,
}

impl Link {
    /// Builds a link pointing at `target`, preserving its user metadata
    /// minus any system-reserved keys.
    #[must_use]
    pub fn to_target(store_id: &str, container: &str, target: &ObjectMeta) -> Self {
        let user_metadata = target
            .user_metadata
            .iter()
            .filter(|(k, _)| !k.starts_with(SYSTEM_METADATA_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            store_id: store_id.to_string(),
            container: container.to_string(),
            name: target.name.clone(),
            etag: target.etag.clone(),
            size: target.size,
            last_modified_ms: epoch_millis(target.last_modified),
            user_metadata,
        }
    }

    /// True if the metadata carries the link tag.
    #[must_use]
    pub fn is_link(meta: &ObjectMeta) -> bool {
        meta.user_metadata.contains_key(LINK_TAG)
    }

    /// Serializes the record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> EngineResult<Bytes> {
        let raw = serde_json::to_vec(self).map_err(|e| EngineError::MalformedLink {
            message: e.to_string(),
        })?;
        Ok(Bytes::from(raw))
    }

    /// Deserializes a record from a link object's payload.
    ///
    /// # Errors
    ///
    /// Returns `MalformedLink` if the payload is not a link record.
    pub fn decode(payload: &[u8]) -> EngineResult<Self> {
        serde_json::from_slice(payload).map_err(|e| EngineError::MalformedLink {
            message: e.to_string(),
        })
    }

    /// The target's last-modified instant.
    #[must_use]
    pub fn last_modified(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(self.last_modified_ms)
    }

    /// Reconstructs the target's metadata as clients should see it.
    #[must_use]
    pub fn target_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            etag: self.etag.clone(),
            size: self.size,
            last_modified: self.last_modified(),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

fn epoch_millis(instant: SystemTime) -> u64 {
    instant
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// -----------------------------------------------------------------------------
// Operations
// -----------------------------------------------------------------------------

/// Overwrites the near-tier object named by `link` with the encoded
/// pointer record, in a single put. Afterwards the near tier holds only
/// the pointer, not the original bytes.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub async fn create_link<S: ObjectStore + ?Sized>(
    near: &S,
    container: &str,
    link: &Link,
) -> EngineResult<String> {
    let payload = link.encode()?;
    let mut metadata = BTreeMap::new();
    metadata.insert(LINK_TAG.to_string(), "true".to_string());
    let etag = near.put(container, &link.name, payload, metadata).await?;
    Ok(etag)
}

/// Removes system-reserved keys from metadata before it is handed to a
/// client.
pub fn scrub_system_metadata(meta: &mut ObjectMeta) {
    meta.user_metadata
        .retain(|k, _| !k.starts_with(SYSTEM_METADATA_PREFIX));
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn target_meta() -> ObjectMeta {
        let mut user_metadata = BTreeMap::new();
        user_metadata.insert("content-kind".to_string(), "photo".to_string());
        user_metadata.insert(
            format!("{SYSTEM_METADATA_PREFIX}internal"),
            "x".to_string(),
        );
        ObjectMeta {
            name: "album/cat.jpg".to_string(),
            etag: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            size: 12345,
            last_modified: SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000),
            user_metadata,
        }
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let link = Link::to_target("far-store", "photos", &target_meta());
        let decoded = Link::decode(&link.encode().unwrap()).unwrap();
        assert_eq!(decoded, link);

        let meta = decoded.target_meta();
        assert_eq!(meta.name, "album/cat.jpg");
        assert_eq!(meta.size, 12345);
        assert_eq!(meta.etag, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            meta.last_modified,
            SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000)
        );
        assert_eq!(meta.user_metadata.get("content-kind").unwrap(), "photo");
    }

    #[test]
    fn test_system_keys_not_carried_into_link() {
        let link = Link::to_target("far-store", "photos", &target_meta());
        assert!(!link
            .user_metadata
            .keys()
            .any(|k| k.starts_with(SYSTEM_METADATA_PREFIX)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = Link::decode(b"not a link record");
        assert!(matches!(result, Err(EngineError::MalformedLink { .. })));
    }

    #[test]
    fn test_is_link_checks_tag_not_payload() {
        let mut meta = target_meta();
        assert!(!Link::is_link(&meta));
        meta.user_metadata
            .insert(LINK_TAG.to_string(), "true".to_string());
        assert!(Link::is_link(&meta));
    }

    #[test]
    fn test_scrub_system_metadata() {
        let mut meta = target_meta();
        meta.user_metadata
            .insert(LINK_TAG.to_string(), "true".to_string());
        scrub_system_metadata(&mut meta);
        assert!(!meta.user_metadata.contains_key(LINK_TAG));
        assert!(meta.user_metadata.contains_key("content-kind"));
    }
}
