//! Grid spatial index.
//!
//! Persistent envelope-per-row index with staleness tracking. The source
//! table's owner advances a monotonic modification stamp on every write;
//! the registry records the stamp a table was last indexed at. A table is
//! *indexed* iff its registry record exists and
//! `last_indexed_ms >= source.last_modified()` — checked on every call,
//! never assumed.
//!
//! A full reindex streams the source in fixed-size chunks rather than one
//! unbounded scan, bounding memory and write-lock duration. Rows whose
//! geometry fails to decode are counted and skipped; a single bad row
//! never aborts the batch. Cancellation is cooperative, checked between
//! chunks and between rows, and a cancelled pass never advances the
//! freshness stamp — the table deliberately stays stale.

use crate::config::IndexConfig;
use crate::envelope::Envelope;
use crate::error::{Result, SpatialError};
use crate::geometry::{extract_envelope, GeometryCodec};
use crate::id_query::NestedIdQuery;
use crate::store::{IndexEntry, IndexStore, TableRegistryRecord};
use crate::transform::{resolve_region, TransformService};
use geopod_core::{FeatureSource, Row, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal for long-running index passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that never fires unless cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a full reindex pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The table was already fresh; nothing was touched.
    AlreadyFresh,
    /// The pass ran to completion and advanced the freshness stamp.
    Completed { indexed: u64, skipped: u64 },
    /// The pass was cancelled; `indexed` rows were written before the
    /// stop, and the freshness stamp was **not** advanced. `indexed == 0`
    /// means no work was done at all.
    Cancelled { indexed: u64 },
}

impl IndexOutcome {
    /// Rows indexed by this pass.
    pub fn indexed(&self) -> u64 {
        match self {
            IndexOutcome::AlreadyFresh => 0,
            IndexOutcome::Completed { indexed, .. } => *indexed,
            IndexOutcome::Cancelled { indexed } => *indexed,
        }
    }

    /// Whether the pass ran to completion (or found nothing to do).
    pub fn is_complete(&self) -> bool {
        !matches!(self, IndexOutcome::Cancelled { .. })
    }
}

/// Envelope-per-row spatial index over one feature table.
pub struct GridIndex {
    source: Arc<dyn FeatureSource>,
    store: Arc<dyn IndexStore>,
    codec: Arc<dyn GeometryCodec>,
    config: IndexConfig,
}

impl GridIndex {
    /// Create an index handle for one table.
    pub fn new(
        source: Arc<dyn FeatureSource>,
        store: Arc<dyn IndexStore>,
        codec: Arc<dyn GeometryCodec>,
    ) -> Self {
        Self {
            source,
            store,
            codec,
            config: IndexConfig::default(),
        }
    }

    /// Override the default configuration.
    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// The indexed table's name.
    pub fn table_name(&self) -> &str {
        self.source.table_name()
    }

    /// Active configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Whether a registry record exists at all (the table was ever
    /// indexed, fresh or not).
    pub fn exists(&self) -> Result<bool> {
        Ok(self.store.registry_get(self.table_name())?.is_some())
    }

    /// Evaluate the freshness invariant.
    pub fn is_indexed(&self) -> Result<bool> {
        Ok(match self.store.registry_get(self.table_name())? {
            Some(record) => record.last_indexed_ms >= self.source.last_modified(),
            None => false,
        })
    }

    /// Stamp of the last successful index pass, if any.
    pub fn last_indexed(&self) -> Result<Option<i64>> {
        Ok(self
            .store
            .registry_get(self.table_name())?
            .map(|r| r.last_indexed_ms))
    }

    /// Full reindex.
    ///
    /// Returns [`IndexOutcome::AlreadyFresh`] without touching anything if
    /// the table is fresh and `force` is false. Otherwise deletes every
    /// existing entry for the table and streams the source in
    /// `chunk_size` chunks, upserting one entry per geometry-bearing row.
    pub fn index(&self, force: bool, cancel: &CancelToken) -> Result<IndexOutcome> {
        let table = self.table_name();
        if !force && self.is_indexed()? {
            tracing::debug!(table, "index already fresh");
            return Ok(IndexOutcome::AlreadyFresh);
        }

        let previous = self.last_indexed()?;
        self.store.delete_entries(table)?;

        let mut indexed = 0u64;
        let mut skipped = 0u64;
        let mut offset = 0u64;
        let chunk_size = self.config.chunk_size;

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(table, indexed, "reindex cancelled between chunks");
                return Ok(IndexOutcome::Cancelled { indexed });
            }

            let rows = self.source.scan_chunk(chunk_size, offset)?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len();

            for row in rows {
                if cancel.is_cancelled() {
                    tracing::warn!(table, indexed, "reindex cancelled mid-chunk");
                    return Ok(IndexOutcome::Cancelled { indexed });
                }
                match self.index_row_entry(&row) {
                    Ok(true) => indexed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        skipped += 1;
                        tracing::debug!(
                            table,
                            feature_id = row.id(),
                            error = %e,
                            "skipping row with undecodable geometry"
                        );
                    }
                }
            }

            if fetched < chunk_size {
                break;
            }
            offset += fetched as u64;
        }

        // The stamp moves only on a completed pass; persisting it is part
        // of the pass succeeding.
        self.advance_stamp(previous, force)?;
        tracing::info!(table, indexed, skipped, "full reindex complete");
        Ok(IndexOutcome::Completed { indexed, skipped })
    }

    /// Incremental single-row indexing.
    ///
    /// Caller contract: write the row, call this, then advance the source
    /// table's modification stamp; the indexer does not verify the order.
    /// The freshness stamp is refreshed unconditionally. Returns whether
    /// an entry was produced; an absent/empty geometry deletes any prior
    /// entry and returns false.
    pub fn index_row(&self, row: &Row) -> Result<bool> {
        let produced = self.index_row_entry(row)?;
        self.advance_stamp(self.last_indexed()?, false)?;
        Ok(produced)
    }

    /// Remove every entry and the registry record for this table.
    pub fn delete_index(&self) -> Result<()> {
        let table = self.table_name();
        let removed = self.store.delete_entries(table)?;
        self.store.registry_delete(table)?;
        tracing::debug!(table, removed, "grid index deleted");
        Ok(())
    }

    /// Remove the entry for one feature. Returns whether it existed.
    pub fn delete_entry(&self, feature_id: i64) -> Result<bool> {
        Ok(self.store.delete_entry(self.table_name(), feature_id)?)
    }

    /// Number of entries currently indexed.
    pub fn entry_count(&self) -> Result<u64> {
        Ok(self.store.entry_count(self.table_name())?)
    }

    /// Feature ids whose indexed envelope intersects `region` within ε,
    /// deduplicated in scan order. `region = None` selects every indexed
    /// feature.
    pub fn query_ids(
        &self,
        region: Option<&Envelope>,
        region_srs: Option<i64>,
        transforms: Option<&Arc<dyn TransformService>>,
    ) -> Result<NestedIdQuery> {
        let resolved = match region {
            Some(r) => Some(resolve_region(
                r,
                region_srs,
                self.source.srs_id(),
                transforms,
            )?),
            None => None,
        };
        let entries = self.store.scan_intersecting(
            self.table_name(),
            resolved.as_ref(),
            self.config.tolerance,
        )?;
        Ok(NestedIdQuery::from_ids(
            entries.iter().map(|e| e.feature_id),
        ))
    }

    /// Upsert or delete the entry for one row; `Ok(true)` iff an entry
    /// now exists. `Err` means the blob failed to decode (a skip signal
    /// for batch callers).
    fn index_row_entry(&self, row: &Row) -> Result<bool> {
        let table = self.table_name();
        let blob = match row.get(self.source.geometry_column()) {
            None | Some(Value::Null) => {
                self.store.delete_entry(table, row.id())?;
                return Ok(false);
            }
            Some(Value::Blob(blob)) => blob,
            Some(other) => {
                return Err(SpatialError::Decode(format!(
                    "geometry column holds a non-blob value: {other}"
                )));
            }
        };

        let decoded = self.codec.decode(blob)?;
        match extract_envelope(&decoded) {
            Some(envelope) => {
                self.store.upsert_entry(IndexEntry {
                    container_id: self.store.container_id().to_string(),
                    table_name: table.to_string(),
                    feature_id: row.id(),
                    envelope,
                })?;
                Ok(true)
            }
            None => {
                self.store.delete_entry(table, row.id())?;
                Ok(false)
            }
        }
    }

    /// Persist the new freshness stamp.
    ///
    /// The stamp is the source's content stamp, pushed past the previous
    /// index stamp on a forced rebuild so repeated `force` passes always
    /// strictly advance. A persistence failure here is fatal for the
    /// indexing call — an unpersisted stamp must not claim freshness.
    fn advance_stamp(&self, previous: Option<i64>, force: bool) -> Result<()> {
        let mut stamp = self.source.last_modified();
        if force {
            if let Some(prev) = previous {
                stamp = stamp.max(prev + 1);
            }
        }
        self.store.registry_put(TableRegistryRecord {
            container_id: self.store.container_id().to_string(),
            table_name: self.table_name().to_string(),
            last_indexed_ms: stamp,
        })?;
        Ok(())
    }
}
