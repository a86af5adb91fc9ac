//! The two-level filter registry.
//!
//! Maps keyspace → column family → one [`CuckooFilter`], creating filters
//! lazily the first time a key is added for a table. System keyspaces are
//! excluded entirely: adds and deletes for them are no-ops and lookups are
//! a policy violation.
//!
//! ## Concurrency
//!
//! One coarse `RwLock` guards the whole two-level map, which also covers
//! the check-then-create race on lazy construction: two concurrent adds
//! for the same new table serialize on the write lock and the second one
//! reuses the filter the first created. The dirty flag is a separate
//! atomic so the persistence loop never contends with foreground calls
//! just to poll it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::config::Options;
use crate::error::Result;
use crate::filter::{CuckooFilter, Filter};
use crate::key::{FilterKey, TableId};
use crate::Error;

/// The nested map persisted to disk: keyspace → column family → filter.
pub type TableMap = HashMap<String, HashMap<String, CuckooFilter>>;

/// Registry of per-table membership filters.
pub struct FilterRegistry {
    /// keyspace → column family → filter
    tables: RwLock<TableMap>,

    /// Set after every mutation, cleared by the persistence loop.
    dirty: AtomicBool,

    /// Construction parameters for lazily created filters, plus the
    /// system keyspace exclusion list.
    options: Options,
}

impl FilterRegistry {
    /// Creates an empty registry using the given filter construction options.
    pub fn new(options: Options) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            options,
        }
    }

    /// Adds a key to the table's filter, creating the filter if this is the
    /// first add for the table.
    ///
    /// Returns `false` without touching the registry when the keyspace is a
    /// system keyspace, and `false` when the filter reports overflow; both
    /// are soft outcomes, not errors.
    pub fn add(&self, table: &TableId, key: &FilterKey<'_>) -> Result<bool> {
        if self.options.is_system_keyspace(&table.keyspace) {
            log::trace!("Ignoring add to filter for system keyspace {}", table.keyspace);
            return Ok(false);
        }

        let mut tables = self.tables.write();

        let cf_map = tables.entry(table.keyspace.clone()).or_default();

        let filter = match cf_map.entry(table.column_family.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let filter = CuckooFilter::new(
                    self.options.filter_capacity,
                    self.options.false_positive_rate,
                    self.options.max_kicks,
                )?;
                log::info!(
                    "Created filter for table {} (capacity={}, rate={})",
                    table,
                    self.options.filter_capacity,
                    self.options.false_positive_rate
                );
                entry.insert(filter)
            }
        };

        let added = filter.add(key);
        if !added {
            log::warn!("Filter for table {} rejected key (overflow)", table);
        }

        drop(tables);
        self.mark_dirty();

        Ok(added)
    }

    /// Removes a key from the table's filter.
    ///
    /// Missing keyspace, missing column family, and system keyspaces all
    /// resolve to a `false` no-op; only real removals mark the registry
    /// dirty.
    pub fn delete(&self, table: &TableId, key: &FilterKey<'_>) -> bool {
        if self.options.is_system_keyspace(&table.keyspace) {
            log::trace!("Ignoring delete from filter for system keyspace {}", table.keyspace);
            return false;
        }

        let mut tables = self.tables.write();

        let Some(cf_map) = tables.get_mut(&table.keyspace) else {
            log::warn!("Tried to delete key from nonexistent filter. Keyspace: {}", table.keyspace);
            return false;
        };

        let Some(filter) = cf_map.get_mut(&table.column_family) else {
            log::warn!(
                "Tried to delete key from nonexistent filter. ColumnFamily: {}",
                table.column_family
            );
            return false;
        };

        let removed = filter.delete(key);

        drop(tables);
        if removed {
            self.mark_dirty();
        }

        removed
    }

    /// Tests whether a key may be present in the table's filter.
    ///
    /// # Errors
    /// Returns `Error::DisallowedLookup` for system keyspaces; lookups
    /// against them are a policy violation rather than a skipped call.
    ///
    /// A table with no filter yet answers `Ok(false)`: nothing known is
    /// present.
    pub fn is_present(&self, table: &TableId, key: &FilterKey<'_>) -> Result<bool> {
        if self.options.is_system_keyspace(&table.keyspace) {
            return Err(Error::disallowed_lookup(&table.keyspace));
        }

        let tables = self.tables.read();

        let Some(cf_map) = tables.get(&table.keyspace) else {
            log::warn!("Tried to lookup key in nonexistent filter. Keyspace: {}", table.keyspace);
            return Ok(false);
        };

        let Some(filter) = cf_map.get(&table.column_family) else {
            log::warn!(
                "Tried to lookup key in nonexistent filter. ColumnFamily: {}",
                table.column_family
            );
            return Ok(false);
        };

        Ok(filter.might_contain(key))
    }

    /// Clones the full table map under a read lock.
    ///
    /// The persistence loop serializes and writes the clone after releasing
    /// the lock, so foreground operations never wait on disk I/O.
    pub fn snapshot(&self) -> TableMap {
        self.tables.read().clone()
    }

    /// Replaces the table map with state loaded from disk.
    pub fn restore(&self, tables: TableMap) {
        let mut guard = self.tables.write();
        *guard = tables;
    }

    /// Marks the registry as mutated since the last flush.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Atomically reads and clears the dirty flag.
    ///
    /// The flush loop clears the flag before snapshotting; a mutation that
    /// races with the snapshot re-sets it and is captured next cycle.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Returns true if the registry has mutated since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Number of tables with a filter.
    pub fn table_count(&self) -> usize {
        self.tables.read().values().map(|cf_map| cf_map.len()).sum()
    }

    /// Returns true if a filter exists for the table.
    pub fn contains_table(&self, table: &TableId) -> bool {
        self.tables
            .read()
            .get(&table.keyspace)
            .is_some_and(|cf_map| cf_map.contains_key(&table.column_family))
    }
}
