//! Record Store
//!
//! Durable mapping from entity key to record. The mapping is held in memory and
//! written out as a full snapshot on every `save`; the pipeline calls `save`
//! after each entity so a crash loses at most the entity in flight.

pub mod persistence;

pub use persistence::{load_records, save_records, temp_path_for, RecordMap, STORE_VERSION};

use crate::error::StorageError;
use crate::types::{EntityKey, Record};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed record store. Single writer; not shared across processes.
pub struct RecordStore {
    path: PathBuf,
    records: RecordMap,
}

impl RecordStore {
    /// Open the store at `path`, loading whatever snapshot exists there.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let records = load_records(&path)?;
        debug!(path = %path.display(), records = records.len(), "Record store loaded");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Record> {
        self.records.get(key)
    }

    /// Insert or replace the record under its own key. Not persisted until `save`.
    pub fn put(&mut self, record: Record) {
        self.records.insert(record.key.clone(), record);
    }

    /// Persist the full mapping.
    pub fn save(&self) -> Result<(), StorageError> {
        save_records(&self.path, &self.records)?;
        debug!(path = %self.path.display(), records = self.records.len(), "Record store saved");
        Ok(())
    }

    /// Drop every record and persist the empty store immediately.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        let removed = self.records.len();
        self.records.clear();
        self.save()?;
        info!(path = %self.path.display(), removed, "Record store cleared");
        Ok(())
    }

    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Record)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
