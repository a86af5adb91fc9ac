//! Key types at the host boundary.
//!
//! The host storage engine owns both the row identity and the hashing call.
//! A [`FilterKey`] carries the opaque key bytes together with the two-word
//! hash pair the host already computed for the row; the filter layer never
//! hashes key bytes itself. The same key must always arrive with the same
//! hash pair, which is what guarantees that add, delete, and lookup agree
//! on the candidate buckets.

use std::fmt;

/// Identifies one logical table: a (keyspace, column family) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    /// Keyspace name.
    pub keyspace: String,
    /// Column family name.
    pub column_family: String,
}

impl TableId {
    /// Creates a new table identifier.
    pub fn new(keyspace: impl Into<String>, column_family: impl Into<String>) -> Self {
        Self { keyspace: keyspace.into(), column_family: column_family.into() }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.column_family)
    }
}

/// A row key as seen by the filter layer.
///
/// Borrowed for the duration of a single operation; only the fingerprint
/// derived from the hash pair is ever retained by a filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterKey<'a> {
    bytes: &'a [u8],
    hash: [u64; 2],
}

impl<'a> FilterKey<'a> {
    /// Wraps a key identity and its host-computed hash pair.
    pub fn new(bytes: &'a [u8], hash: [u64; 2]) -> Self {
        Self { bytes, hash }
    }

    /// The opaque key bytes (diagnostics only; not consumed by filters).
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The host-supplied hash pair.
    pub fn hash(&self) -> [u64; 2] {
        self.hash
    }
}
