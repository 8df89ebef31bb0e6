//! The marker protocol.
//!
//! A marker is a zero-length sentinel object at the near tier whose name is
//! a reversible encoding of a data object's name plus a fixed suffix. Its
//! presence means "the most recent foreground mutation of this name has not
//! yet been reconciled". At most one marker exists per name; reconciliation
//! deletes it exactly when it reaches a terminal outcome.
//!
//! Marker names are percent-escaped by default so they survive stores with
//! their own name-encoding rules; stores that keep names verbatim (the
//! in-memory test store) skip the escaping, which also keeps markers
//! sorting adjacent to their targets in listings.

use std::sync::OnceLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Suffix appended to the (possibly escaped) object name to form its
/// marker's name.
pub const MARKER_SUFFIX: &str = "     strata!log";

/// Prefix of the namespace reserved for gateway bookkeeping. Client
/// operations never touch names under it.
pub const INTERNAL_PREFIX: &str = ".strata internal reserved prefix/";

/// Sentinel recording that a namespace needs a takeover run.
pub const TAKEOVER_MARKER: &str = ".strata internal reserved prefix/need_take_over";

/// Escape set for marker names: everything but unreserved characters and
/// the path-ish exceptions `/ : ; =`.
const MARKER_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// How a marker name encodes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameEncoding {
    /// Percent-escape the object name and suffix.
    Escaped,
    /// Concatenate verbatim; for stores that preserve raw names.
    Verbatim,
}

fn escaped_suffix() -> &'static str {
    static SUFFIX: OnceLock<String> = OnceLock::new();
    SUFFIX.get_or_init(|| utf8_percent_encode(MARKER_SUFFIX, MARKER_ESCAPE).to_string())
}

/// Builds the marker name for an object name.
#[must_use]
pub fn marker_name(name: &str, encoding: NameEncoding) -> String {
    match encoding {
        NameEncoding::Verbatim => format!("{name}{MARKER_SUFFIX}"),
        NameEncoding::Escaped => format!(
            "{}{}",
            utf8_percent_encode(name, MARKER_ESCAPE),
            escaped_suffix()
        ),
    }
}

/// True if `name` is a marker in either encoding.
#[must_use]
pub fn is_marker(name: &str) -> bool {
    name.ends_with(MARKER_SUFFIX) || name.ends_with(escaped_suffix())
}

/// Inverse of [`marker_name`]: recovers the object name a marker records,
/// or `None` if `name` is not a marker.
#[must_use]
pub fn marker_target(name: &str) -> Option<String> {
    if let Some(stripped) = name.strip_suffix(MARKER_SUFFIX) {
        return Some(stripped.to_string());
    }
    let stripped = name.strip_suffix(escaped_suffix())?;
    Some(percent_decode_str(stripped).decode_utf8_lossy().into_owned())
}

/// True if `name` lies in the reserved internal namespace.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

/// True if a client-supplied name collides with the marker namespace.
#[must_use]
pub fn has_marker_suffix(name: &str) -> bool {
    is_marker(name)
}
