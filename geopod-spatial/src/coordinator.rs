//! Index coordinator.
//!
//! A table may have neither, one, or both index backends built. The
//! session holds the grid backend, optionally the native range backend,
//! and a priority order; `prioritize` chooses which backend subsequent
//! `count()`/`query()` calls delegate to. When no prioritized backend
//! exists the session fails fast with [`SpatialError::NotIndexed`] — an
//! empty result would be indistinguishable from "no matches".
//!
//! Each session owns its single-flight row cache; nothing here is a
//! process-wide static.

use crate::config::IndexConfig;
use crate::envelope::Envelope;
use crate::error::{Result, SpatialError};
use crate::geometry::GeometryCodec;
use crate::grid::GridIndex;
use crate::id_query::NestedIdQuery;
use crate::query::{fetch_rows, FeatureQueryResult, QueryOptions};
use crate::row_cache::{Fetch, RowCache};
use crate::rtree::NativeRangeIndex;
use crate::store::IndexStore;
use crate::transform::TransformService;
use geopod_core::{FeatureSource, RangeIndexSupport, Row};
use std::sync::Arc;

/// The two index backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Grid/metadata-table index with freshness tracking.
    Grid,
    /// Trigger-maintained native range index.
    NativeRange,
}

/// Tagged variant over the common backend interface.
pub enum SpatialBackend {
    Grid(GridIndex),
    NativeRange(NativeRangeIndex),
}

impl SpatialBackend {
    /// Which family this backend belongs to.
    pub fn kind(&self) -> BackendKind {
        match self {
            SpatialBackend::Grid(_) => BackendKind::Grid,
            SpatialBackend::NativeRange(_) => BackendKind::NativeRange,
        }
    }

    /// Whether the backend's structures exist for the table.
    pub fn exists(&self) -> Result<bool> {
        match self {
            SpatialBackend::Grid(grid) => grid.exists(),
            SpatialBackend::NativeRange(rtree) => Ok(rtree.exists()),
        }
    }

    /// Build the backend's structures (a full grid index pass, or shadow
    /// creation).
    pub fn create(&self) -> Result<()> {
        match self {
            SpatialBackend::Grid(grid) => {
                grid.index(false, &crate::grid::CancelToken::new())?;
                Ok(())
            }
            SpatialBackend::NativeRange(rtree) => rtree.create(),
        }
    }

    /// Tear the backend's structures down.
    pub fn delete(&self) -> Result<()> {
        match self {
            SpatialBackend::Grid(grid) => grid.delete_index(),
            SpatialBackend::NativeRange(rtree) => rtree.delete(),
        }
    }

    /// Whether the backend currently reflects the table's content: the
    /// freshness invariant for the grid, structural existence for the
    /// trigger-maintained shadow.
    pub fn is_consistent(&self) -> Result<bool> {
        match self {
            SpatialBackend::Grid(grid) => grid.is_indexed(),
            SpatialBackend::NativeRange(rtree) => Ok(rtree.is_consistent()),
        }
    }

    /// Matching feature ids for a window.
    pub fn query_ids(
        &self,
        region: Option<&Envelope>,
        region_srs: Option<i64>,
        transforms: Option<&Arc<dyn TransformService>>,
    ) -> Result<NestedIdQuery> {
        match self {
            SpatialBackend::Grid(grid) => grid.query_ids(region, region_srs, transforms),
            SpatialBackend::NativeRange(rtree) => rtree.query_ids(region, region_srs, transforms),
        }
    }

    /// Number of index hits for a window.
    pub fn count(
        &self,
        region: Option<&Envelope>,
        region_srs: Option<i64>,
        transforms: Option<&Arc<dyn TransformService>>,
    ) -> Result<u64> {
        Ok(self.query_ids(region, region_srs, transforms)?.len() as u64)
    }
}

/// Per-table index session: backends, priority order, and the
/// session-scoped row cache.
pub struct FeatureIndexSession {
    source: Arc<dyn FeatureSource>,
    codec: Arc<dyn GeometryCodec>,
    config: IndexConfig,
    transforms: Option<Arc<dyn TransformService>>,
    backends: Vec<SpatialBackend>,
    cache: Arc<RowCache>,
}

impl FeatureIndexSession {
    /// Create a session with the grid backend only.
    pub fn new(
        source: Arc<dyn FeatureSource>,
        store: Arc<dyn IndexStore>,
        codec: Arc<dyn GeometryCodec>,
        config: IndexConfig,
    ) -> Self {
        let grid = GridIndex::new(Arc::clone(&source), store, Arc::clone(&codec))
            .with_config(config);
        Self {
            source,
            codec,
            config,
            transforms: None,
            backends: vec![SpatialBackend::Grid(grid)],
            cache: Arc::new(RowCache::new()),
        }
    }

    /// Add the native range backend over the container's range
    /// capability.
    pub fn with_native_range(mut self, range: Arc<dyn RangeIndexSupport>) -> Self {
        let rtree = NativeRangeIndex::new(
            Arc::clone(&self.source),
            range,
            Arc::clone(&self.codec),
        )
        .with_config(self.config);
        self.backends.push(SpatialBackend::NativeRange(rtree));
        self
    }

    /// Attach a CRS transform service for cross-reference query windows.
    pub fn with_transforms(mut self, transforms: Arc<dyn TransformService>) -> Self {
        self.transforms = Some(transforms);
        self
    }

    /// Move a backend family to the front of the delegation order.
    pub fn prioritize(&mut self, kind: BackendKind) {
        if let Some(pos) = self.backends.iter().position(|b| b.kind() == kind) {
            let backend = self.backends.remove(pos);
            self.backends.insert(0, backend);
        }
    }

    /// The grid backend.
    pub fn grid(&self) -> &GridIndex {
        self.backends
            .iter()
            .find_map(|b| match b {
                SpatialBackend::Grid(grid) => Some(grid),
                _ => None,
            })
            .expect("session always carries a grid backend")
    }

    /// The native range backend, when configured.
    pub fn native_range(&self) -> Option<&NativeRangeIndex> {
        self.backends.iter().find_map(|b| match b {
            SpatialBackend::NativeRange(rtree) => Some(rtree),
            _ => None,
        })
    }

    /// All backends in current delegation order.
    pub fn backends(&self) -> &[SpatialBackend] {
        &self.backends
    }

    /// The session's row cache.
    pub fn row_cache(&self) -> &Arc<RowCache> {
        &self.cache
    }

    /// First backend in priority order whose structures exist.
    fn active_backend(&self) -> Result<&SpatialBackend> {
        for backend in &self.backends {
            if backend.exists()? {
                return Ok(backend);
            }
        }
        Err(SpatialError::NotIndexed(
            self.source.table_name().to_string(),
        ))
    }

    /// Windowed feature query through the prioritized backend.
    pub fn query(&self, options: &QueryOptions) -> Result<FeatureQueryResult> {
        let backend = self.active_backend()?;
        let ids = backend.query_ids(
            options.region.as_ref(),
            options.region_srs,
            self.transforms.as_ref(),
        )?;
        fetch_rows(&self.source, ids, options, Some(Arc::clone(&self.cache)))
    }

    /// Row count through the prioritized backend, consistent with
    /// [`query`](Self::query)'s fetch path.
    pub fn count(&self, options: &QueryOptions) -> Result<u64> {
        if options.predicate.is_none() {
            let backend = self.active_backend()?;
            return backend.count(
                options.region.as_ref(),
                options.region_srs,
                self.transforms.as_ref(),
            );
        }
        let result = self.query(options)?;
        let mut cursor = result.cursor;
        cursor.close();
        Ok(result.count)
    }

    /// Fetch one row by id through the session's single-flight cache.
    ///
    /// Concurrent callers for the same id share one underlying fetch.
    pub fn fetch_row(&self, feature_id: i64) -> Result<Option<Arc<Row>>> {
        match self.cache.get_or_claim(feature_id) {
            Fetch::Ready(row) => Ok(row),
            Fetch::Claimed => match self.source.fetch(feature_id) {
                Ok(row) => {
                    let shared = row.map(Arc::new);
                    self.cache.publish(feature_id, shared.clone());
                    Ok(shared)
                }
                Err(e) => {
                    self.cache.abandon(feature_id);
                    Err(e.into())
                }
            },
        }
    }
}
