//! Object and page metadata model.

use std::collections::BTreeMap;
use std::time::SystemTime;

use bytes::Bytes;

// -----------------------------------------------------------------------------
// ObjectMeta
// -----------------------------------------------------------------------------

/// Metadata of a stored object as reported by a single tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object name within its container.
    pub name: String,
    /// Content hash, hex MD5 of the payload.
    pub etag: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Last modification instant as stamped by the store.
    pub last_modified: SystemTime,
    /// User metadata. System-reserved keys may be present; the gateway
    /// scrubs them before handing metadata to clients.
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// True if `self` and `other` describe the same object contents,
    /// ignoring the modification instant.
    #[must_use]
    pub fn equals_other_than_time(&self, other: &Self) -> bool {
        self.name == other.name && self.size == other.size && etags_equal(&self.etag, &other.etag)
    }
}

/// A fetched object: metadata plus payload bytes.
#[derive(Debug, Clone)]
pub struct Object {
    /// The object's metadata.
    pub meta: ObjectMeta,
    /// The payload.
    pub payload: Bytes,
}

/// Compares two etags, ignoring surrounding double quotes.
///
/// S3-style clients quote etags in conditional headers; stores report them
/// bare.
#[must_use]
pub fn etags_equal(a: &str, b: &str) -> bool {
    a.trim_matches('"') == b.trim_matches('"')
}

// -----------------------------------------------------------------------------
// Options
// -----------------------------------------------------------------------------

/// Options for a get operation.
///
/// Conditional fields are evaluated by the gateway against resolved metadata
/// before any payload transfer; store implementations may ignore them.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Succeed only if the etag matches.
    pub if_match: Option<String>,
    /// Succeed only if the etag does not match.
    pub if_none_match: Option<String>,
    /// Succeed only if modified after this instant.
    pub if_modified_since: Option<SystemTime>,
    /// Succeed only if not modified after this instant.
    pub if_unmodified_since: Option<SystemTime>,
}

impl GetOptions {
    /// True if any conditional field is set.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        self.if_match.is_some()
            || self.if_none_match.is_some()
            || self.if_modified_since.is_some()
            || self.if_unmodified_since.is_some()
    }
}

/// Options for a copy operation.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Replacement user metadata for the destination. `None` keeps the
    /// source metadata; `Some` replaces it wholesale.
    pub user_metadata: Option<BTreeMap<String, String>>,
}

/// Options for a list operation.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only names starting with this prefix.
    pub prefix: Option<String>,
    /// Page size cap; stores default this when unset.
    pub max_results: Option<u32>,
    /// Resume strictly after this name.
    pub start_after: Option<String>,
}

// -----------------------------------------------------------------------------
// Page
// -----------------------------------------------------------------------------

/// One page of a listing, sorted by name.
#[derive(Debug, Clone)]
pub struct Page {
    /// Entries in strictly increasing name order.
    pub entries: Vec<ObjectMeta>,
    /// Continuation token: the last name of this page, when truncated.
    pub next: Option<String>,
}

impl Page {
    /// An empty, final page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next: None,
        }
    }
}
