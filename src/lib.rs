//! # TableFilter - Per-Table Approximate Membership Indexes
//!
//! TableFilter maintains one probabilistic membership filter per logical
//! table of a hosting storage engine, keyed by (keyspace, column family).
//! Filters answer "is this key possibly present?" with a bounded false
//! positive rate and no false negatives, letting the host skip slow-path
//! lookups for keys that were never written.
//!
//! ## Architecture
//!
//! - **Cuckoo Filter**: Fixed-capacity probabilistic set with deletion
//!   support, unlike a classic Bloom filter
//! - **Filter Registry**: Lazy two-level map of per-table filters with a
//!   system-keyspace exclusion rule
//! - **Persistence Controller**: Background thread that flushes the
//!   registry to disk when it has changed
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tablefilter::{FilterService, FilterKey, Options, TableId};
//!
//! # fn main() -> Result<(), tablefilter::Error> {
//! let service = FilterService::new("./data", Options::default())?;
//! service.initialize()?;
//!
//! let table = TableId::new("app", "users");
//! // The host supplies the key's hash pair; the service never hashes keys.
//! let key = FilterKey::new(b"row-1", [0x1234_5678_9abc_def0, 0x0fed_cba9_8765_4321]);
//!
//! service.add(&table, &key)?;
//! if service.is_present(&table, &key)? {
//!     println!("key may be present; proceed to the slow path");
//! }
//! service.delete(&table, &key)?;
//!
//! service.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod filter;
pub mod key;
pub mod persist;
pub mod registry;

// Re-exports
pub use config::Options;
pub use error::{Error, Result};
pub use key::{FilterKey, TableId};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use persist::{spawn_flush_loop, FilterStore, FlushHandle};
use registry::FilterRegistry;

/// The membership index service.
///
/// This is the primary interface for the host storage engine. It owns the
/// per-table filter registry and the background persistence thread, and
/// shields callers from missing-filter states: adding to a table that has
/// no filter yet creates one, and looking up against one answers "nothing
/// known is present".
///
/// # Lifecycle
///
/// Construct with [`FilterService::new`], then call
/// [`initialize`](FilterService::initialize) once at host startup and
/// [`shutdown`](FilterService::shutdown) once at host shutdown. Both are
/// idempotent but must be driven from a single control path; they are not
/// safe to call concurrently with themselves. All other operations fail
/// with [`Error::Uninitialized`] outside the initialized window.
///
/// # Thread Safety
///
/// `FilterService` is designed to be shared across threads using
/// `Arc<FilterService>`; add/delete/is_present may be called from any
/// number of concurrent callers.
pub struct FilterService {
    /// Data directory holding the filter store file
    data_dir: PathBuf,

    /// Configuration options
    options: Options,

    /// Per-table filter registry
    registry: Arc<FilterRegistry>,

    /// On-disk store for the registry
    store: Arc<FilterStore>,

    /// True between a successful initialize() and shutdown()
    initialized: AtomicBool,

    /// Background flush thread handle, present while initialized
    flush_handle: Mutex<Option<FlushHandle>>,
}

impl FilterService {
    /// Creates a new, not-yet-initialized service.
    ///
    /// Does not touch the filesystem; call
    /// [`initialize`](FilterService::initialize) to load persisted state
    /// and start the background flush loop.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the options are invalid.
    pub fn new<P: AsRef<std::path::Path>>(data_dir: P, options: Options) -> Result<Self> {
        options.validate()?;

        let data_dir = data_dir.as_ref().to_path_buf();
        let registry = Arc::new(FilterRegistry::new(options.clone()));
        let store = Arc::new(FilterStore::new(&data_dir));

        Ok(Self {
            data_dir,
            options,
            registry,
            store,
            initialized: AtomicBool::new(false),
            flush_handle: Mutex::new(None),
        })
    }

    /// Initializes the service: loads persisted filters and starts the
    /// background flush loop.
    ///
    /// Idempotent; a second call while already initialized is a no-op.
    /// Loading happens synchronously before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data directory is missing and `create_if_missing` is false
    /// - A filter store exists but cannot be read or parsed (corruption is
    ///   never silently replaced by an empty registry)
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            log::debug!("Filter service already initialized");
            return Ok(());
        }

        if !self.data_dir.exists() {
            if self.options.create_if_missing {
                std::fs::create_dir_all(&self.data_dir)?;
            } else {
                return Err(Error::invalid_argument(format!(
                    "data directory does not exist: {:?}",
                    self.data_dir
                )));
            }
        }

        if let Some(tables) = self.store.load()? {
            log::info!("Loaded persisted filters from {:?}", self.store.path());
            self.registry.restore(tables);
        } else {
            log::info!("No persisted filters found; starting empty");
        }

        let handle = spawn_flush_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.options.flush_interval,
        )?;
        *self.flush_handle.lock() = Some(handle);

        self.initialized.store(true, Ordering::Release);

        Ok(())
    }

    /// Adds a key to the table's filter, creating the filter on first use.
    ///
    /// Returns `Ok(false)` for system keyspaces (the add is skipped) and
    /// when the filter rejects the key with overflow; both are soft
    /// outcomes. The membership index then degrades toward more "maybe
    /// present" answers, never incorrect "definitely absent" ones.
    ///
    /// # Errors
    ///
    /// Returns `Error::Uninitialized` outside the initialized window.
    pub fn add(&self, table: &TableId, key: &FilterKey<'_>) -> Result<bool> {
        self.ensure_initialized()?;
        self.registry.add(table, key)
    }

    /// Removes a key from the table's filter.
    ///
    /// Returns `Ok(false)` when the keyspace is excluded, when no filter
    /// exists for the table, or when no matching fingerprint was found;
    /// deleting an unknown key is always safe.
    ///
    /// # Errors
    ///
    /// Returns `Error::Uninitialized` outside the initialized window.
    pub fn delete(&self, table: &TableId, key: &FilterKey<'_>) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(self.registry.delete(table, key))
    }

    /// Tests whether a key may be present in the table.
    ///
    /// `Ok(true)` means "possibly present" (false positives bounded by the
    /// configured rate); `Ok(false)` means "definitely absent". A table
    /// with no filter yet answers `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Uninitialized` outside the initialized window and
    /// `Error::DisallowedLookup` for system keyspaces.
    pub fn is_present(&self, table: &TableId, key: &FilterKey<'_>) -> Result<bool> {
        self.ensure_initialized()?;
        self.registry.is_present(table, key)
    }

    /// Forces a persistence flush on the calling thread.
    ///
    /// Returns `Ok(true)` if a write happened, `Ok(false)` if the on-disk
    /// state was already current. The background loop makes calling this
    /// unnecessary in normal operation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Uninitialized` outside the initialized window, or
    /// the underlying I/O error if the write fails (the registry stays
    /// dirty so the background loop retries).
    pub fn flush(&self) -> Result<bool> {
        self.ensure_initialized()?;

        self.registry.take_dirty();
        let snapshot = self.registry.snapshot();

        match self.store.save(&snapshot) {
            Ok(wrote) => Ok(wrote),
            Err(e) => {
                self.registry.mark_dirty();
                Err(e)
            }
        }
    }

    /// Shuts the service down: stops the flush loop and waits for it.
    ///
    /// The loop performs a final flush before exiting when the registry is
    /// dirty, so no mutation that completed before this call is lost.
    /// Idempotent; a second call is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            log::debug!("Filter service already shut down");
            return Ok(());
        }

        if let Some(handle) = self.flush_handle.lock().take() {
            handle.shutdown()?;
        }

        log::info!("Filter service shut down");

        Ok(())
    }

    /// Number of tables currently holding a filter.
    pub fn table_count(&self) -> usize {
        self.registry.table_count()
    }

    /// The data directory this service persists into.
    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Uninitialized)
        }
    }
}

impl Drop for FilterService {
    fn drop(&mut self) {
        // Best effort; hosts should call shutdown() themselves.
        if let Err(e) = self.shutdown() {
            log::warn!("Filter service shutdown during drop failed: {}", e);
        }
    }
}
