//! Persisted index state.
//!
//! The subsystem owns two persisted structures per container: a table
//! registry (one record per indexed table, carrying the last-indexed
//! stamp) and a geometry-index table (one envelope per indexed feature
//! row, range-queryable on the four bound columns, point-addressable by
//! `(table, feature_id)`). [`IndexStore`] is the seam a container binding
//! implements over its own metadata tables; [`MemoryIndexStore`] is the
//! in-memory reference used by embedded deployments and tests.

use crate::envelope::Envelope;
use crate::error::Result;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registry record: one per table that has ever been grid-indexed.
///
/// Its absence means "never indexed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegistryRecord {
    /// Owning container.
    pub container_id: String,
    /// Indexed feature table.
    pub table_name: String,
    /// Stamp of the last successful (re)index, compared against the source
    /// table's modification stamp for freshness.
    pub last_indexed_ms: i64,
}

/// One indexed feature row: its envelope under key `(table, feature_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub container_id: String,
    pub table_name: String,
    pub feature_id: i64,
    pub envelope: Envelope,
}

/// Storage seam for the subsystem's persisted state.
pub trait IndexStore: Send + Sync {
    /// Id of the container this store belongs to.
    fn container_id(&self) -> &str;

    /// Registry record for a table, if it was ever indexed.
    fn registry_get(&self, table: &str) -> Result<Option<TableRegistryRecord>>;

    /// Create or replace a registry record.
    ///
    /// Callers treat a failure here as fatal for the indexing call that
    /// produced it — an unpersisted stamp must not claim freshness.
    fn registry_put(&self, record: TableRegistryRecord) -> Result<()>;

    /// Remove a registry record. Returns whether it existed.
    fn registry_delete(&self, table: &str) -> Result<bool>;

    /// Insert or replace the entry for `(entry.table_name, entry.feature_id)`.
    fn upsert_entry(&self, entry: IndexEntry) -> Result<()>;

    /// Point lookup.
    fn get_entry(&self, table: &str, feature_id: i64) -> Result<Option<IndexEntry>>;

    /// Remove one entry. Returns whether it existed.
    fn delete_entry(&self, table: &str, feature_id: i64) -> Result<bool>;

    /// Remove all entries for a table. Returns how many were removed.
    fn delete_entries(&self, table: &str) -> Result<u64>;

    /// Number of entries for a table.
    fn entry_count(&self, table: &str) -> Result<u64>;

    /// Entries whose envelope intersects `region` within `tolerance`;
    /// `None` scans the whole table. Results come back in stable
    /// feature-id order.
    fn scan_intersecting(
        &self,
        table: &str,
        region: Option<&Envelope>,
        tolerance: f64,
    ) -> Result<Vec<IndexEntry>>;
}

struct MemoryInner {
    registry: FxHashMap<String, TableRegistryRecord>,
    entries: BTreeMap<(String, i64), IndexEntry>,
}

/// In-memory [`IndexStore`].
pub struct MemoryIndexStore {
    container_id: String,
    inner: RwLock<MemoryInner>,
}

impl MemoryIndexStore {
    /// Create an empty store for one container.
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            inner: RwLock::new(MemoryInner {
                registry: FxHashMap::default(),
                entries: BTreeMap::new(),
            }),
        }
    }

    fn table_range(table: &str) -> std::ops::RangeInclusive<(String, i64)> {
        (table.to_string(), i64::MIN)..=(table.to_string(), i64::MAX)
    }
}

impl IndexStore for MemoryIndexStore {
    fn container_id(&self) -> &str {
        &self.container_id
    }

    fn registry_get(&self, table: &str) -> Result<Option<TableRegistryRecord>> {
        Ok(self.inner.read().registry.get(table).cloned())
    }

    fn registry_put(&self, record: TableRegistryRecord) -> Result<()> {
        self.inner
            .write()
            .registry
            .insert(record.table_name.clone(), record);
        Ok(())
    }

    fn registry_delete(&self, table: &str) -> Result<bool> {
        Ok(self.inner.write().registry.remove(table).is_some())
    }

    fn upsert_entry(&self, entry: IndexEntry) -> Result<()> {
        self.inner
            .write()
            .entries
            .insert((entry.table_name.clone(), entry.feature_id), entry);
        Ok(())
    }

    fn get_entry(&self, table: &str, feature_id: i64) -> Result<Option<IndexEntry>> {
        Ok(self
            .inner
            .read()
            .entries
            .get(&(table.to_string(), feature_id))
            .cloned())
    }

    fn delete_entry(&self, table: &str, feature_id: i64) -> Result<bool> {
        Ok(self
            .inner
            .write()
            .entries
            .remove(&(table.to_string(), feature_id))
            .is_some())
    }

    fn delete_entries(&self, table: &str) -> Result<u64> {
        let mut inner = self.inner.write();
        let keys: Vec<(String, i64)> = inner
            .entries
            .range(Self::table_range(table))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = keys.len() as u64;
        for key in keys {
            inner.entries.remove(&key);
        }
        Ok(removed)
    }

    fn entry_count(&self, table: &str) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .entries
            .range(Self::table_range(table))
            .count() as u64)
    }

    fn scan_intersecting(
        &self,
        table: &str,
        region: Option<&Envelope>,
        tolerance: f64,
    ) -> Result<Vec<IndexEntry>> {
        let inner = self.inner.read();
        Ok(inner
            .entries
            .range(Self::table_range(table))
            .map(|(_, e)| e)
            .filter(|e| match region {
                Some(r) => e.envelope.intersects(r, tolerance),
                None => true,
            })
            .cloned()
            .collect())
    }
}
