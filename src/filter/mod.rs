//! Filter implementations for approximate key membership.
//!
//! This module provides the probabilistic set structure backing the
//! per-table membership indexes. Unlike a Bloom filter, the cuckoo
//! filter supports deletion, which the index manager needs because
//! row deletions must eventually stop answering "maybe present".

pub mod cuckoo;

pub use cuckoo::CuckooFilter;

use crate::key::FilterKey;

/// Filter trait for key membership testing.
pub trait Filter {
    /// Check if a key may exist (can have false positives)
    fn might_contain(&self, key: &FilterKey<'_>) -> bool;

    /// Add a key to the filter; false means the insert was dropped (overflow)
    fn add(&mut self, key: &FilterKey<'_>) -> bool;

    /// Remove a previously added key; false means no matching entry was found
    fn delete(&mut self, key: &FilterKey<'_>) -> bool;
}
