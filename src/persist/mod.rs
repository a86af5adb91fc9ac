//! Background persistence for the filter registry.
//!
//! The registry is periodically serialized to a single file so filters
//! survive process restarts. A dedicated thread wakes on a fixed interval,
//! checks the registry's dirty flag, and writes a snapshot when something
//! changed. A CRC fingerprint of the serialized bytes skips writes when
//! churn nets out to no change, and writes go through a temp file plus
//! rename so a crash mid-write never leaves a truncated store behind.
//!
//! Write failures are logged and retried on the next cycle rather than
//! escalated: the filters are an optimization, and losing a flush only
//! costs extra slow-path lookups after a restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::{FilterRegistry, TableMap};
use crate::Error;

/// File name of the persisted registry inside the data directory.
pub const FILTER_FILE_NAME: &str = "filters.db";

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned on-disk schema for the persisted registry.
#[derive(Serialize, Deserialize)]
struct SavedFilters {
    version: u32,
    tables: TableMap,
}

/// Reads and writes the registry's on-disk representation.
pub struct FilterStore {
    /// Path of the store file.
    path: PathBuf,

    /// CRC of the last successfully written blob, for skip-on-unchanged.
    last_crc: Mutex<Option<u32>>,
}

impl FilterStore {
    /// Creates a store rooted in the given data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join(FILTER_FILE_NAME),
            last_crc: Mutex::new(None),
        }
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted table map.
    ///
    /// Returns `Ok(None)` when no store file exists (first start). A store
    /// that exists but cannot be read or parsed is a hard error; silently
    /// starting empty would mask corruption.
    pub fn load(&self) -> Result<Option<TableMap>> {
        if !self.path.exists() {
            log::debug!("Filter store does not exist at {:?}", self.path);
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;

        let saved: SavedFilters = bincode::deserialize(&bytes)
            .map_err(|e| Error::corruption(format!("cannot decode filter store: {}", e)))?;

        if saved.version != FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "unsupported filter store version {} (expected {})",
                saved.version, FORMAT_VERSION
            )));
        }

        // Seed the skip check so an unchanged registry is not rewritten
        // right after startup.
        *self.last_crc.lock() = Some(crc32fast::hash(&bytes));

        log::debug!("Loaded filter store from {:?} ({} bytes)", self.path, bytes.len());

        Ok(Some(saved.tables))
    }

    /// Serializes and writes a registry snapshot.
    ///
    /// Returns `Ok(false)` when the serialized bytes match the last
    /// successful write (nothing to do). Writes go to a temp file that is
    /// renamed into place so the store is never truncated by a crash
    /// mid-write.
    pub fn save(&self, tables: &TableMap) -> Result<bool> {
        let saved = SavedFilters { version: FORMAT_VERSION, tables: tables.clone() };
        let bytes = bincode::serialize(&saved)?;

        let crc = crc32fast::hash(&bytes);

        let mut last_crc = self.last_crc.lock();
        if *last_crc == Some(crc) {
            log::debug!("Skipping filter store write; contents unchanged");
            return Ok(false);
        }

        let tmp_path = self.path.with_extension("db.tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &self.path)?;

        *last_crc = Some(crc);

        log::debug!("Saved filter store to {:?} ({} bytes)", self.path, bytes.len());

        Ok(true)
    }
}

/// Handle to the background flush thread.
///
/// Dropping the handle without calling [`FlushHandle::shutdown`] detaches
/// the thread; the service facade always shuts it down explicitly.
pub struct FlushHandle {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushHandle {
    /// Signals the loop to stop and blocks until it has exited.
    ///
    /// The loop performs one final flush before exiting when the registry
    /// is still dirty, so no completed mutation is lost at shutdown.
    pub fn shutdown(self) -> Result<()> {
        // A dropped receiver means the loop already exited; that is fine.
        let _ = self.shutdown_tx.send(());

        self.handle
            .join()
            .map_err(|_| Error::internal("filter flush thread panicked"))
    }
}

/// Spawns the background flush loop.
///
/// The thread wakes every `interval`, flushes when the registry is dirty,
/// and exits on the shutdown signal after a final flush. A failed write
/// re-marks the registry dirty so the next wake retries it.
pub fn spawn_flush_loop(
    registry: Arc<FilterRegistry>,
    store: Arc<FilterStore>,
    interval: Duration,
) -> Result<FlushHandle> {
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

    let handle = std::thread::Builder::new()
        .name("filter-flush".to_string())
        .spawn(move || {
            log::info!("Filter flush loop started (interval {:?})", interval);

            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                flush_if_dirty(&registry, &store);
            }

            // Final flush so mutations completed before shutdown survive.
            flush_if_dirty(&registry, &store);

            log::info!("Filter flush loop stopped");
        })?;

    Ok(FlushHandle { shutdown_tx, handle })
}

/// One flush cycle: clear the dirty flag, snapshot, serialize, write.
///
/// The dirty flag is cleared before the snapshot is taken, so a mutation
/// racing with the snapshot re-sets it and is captured next cycle.
fn flush_if_dirty(registry: &FilterRegistry, store: &FilterStore) {
    if !registry.take_dirty() {
        return;
    }

    let snapshot = registry.snapshot();

    match store.save(&snapshot) {
        Ok(true) => log::debug!("Flushed filter registry ({} keyspaces)", snapshot.len()),
        Ok(false) => {}
        Err(e) => {
            // Retry next cycle; losing a flush degrades lookups, not data.
            log::error!("Failed to save filter store: {}", e);
            registry.mark_dirty();
        }
    }
}
