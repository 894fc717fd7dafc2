//! Query options and result cursors.
//!
//! One options value replaces the historical pile of query overloads:
//! window, window CRS, attribute predicate, projection, distinct — absent
//! fields mean "unconstrained". The fetch dispatcher turns a spatial id
//! set into row retrieval along one of two observably interchangeable
//! paths:
//!
//! - **IN-clause path** (id set fits under the bound-parameter ceiling):
//!   the id list is rendered into the statement; the reported count is the
//!   exact id-set size.
//! - **Fallback path** (over the ceiling): the predicate-only query runs
//!   and each row is post-filtered through O(1) id membership; the
//!   reported count is the post-filter tally. The rendered statement's
//!   parameter count stays independent of result-set size.
//!
//! Cursors are caller-owned and explicitly closeable; dropping one without
//! [`FeatureCursor::close`] leaks the binding's underlying query
//! resources on whatever path abandoned it.

use crate::envelope::Envelope;
use crate::error::Result;
use crate::id_query::NestedIdQuery;
use crate::row_cache::RowCache;
use geopod_core::{BoxedRowSeq, FeatureSource, Predicate, Row, RowQuery};
use std::sync::Arc;

/// Options for one windowed feature query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Query window; `None` selects every indexed feature.
    pub region: Option<Envelope>,

    /// CRS of `region` when it differs from the table's.
    pub region_srs: Option<i64>,

    /// Additional attribute predicate, AND-combined with the spatial hit
    /// set.
    pub predicate: Option<Predicate>,

    /// Columns to project; `None` selects all.
    pub columns: Option<Vec<String>>,

    /// Deduplicate projected rows.
    pub distinct: bool,
}

impl QueryOptions {
    /// Query everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a window in the table's CRS.
    pub fn with_region(mut self, region: Envelope) -> Self {
        self.region = Some(region);
        self
    }

    /// Declare the window's CRS.
    pub fn with_region_srs(mut self, srs_id: i64) -> Self {
        self.region_srs = Some(srs_id);
        self
    }

    /// Attach an attribute predicate.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Project onto the named columns.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Deduplicate projected rows.
    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

/// Lazy, closeable sequence of feature rows.
pub struct FeatureCursor {
    seq: Option<BoxedRowSeq>,
    membership: Option<Arc<NestedIdQuery>>,
    cache: Option<Arc<RowCache>>,
}

impl FeatureCursor {
    fn new(seq: BoxedRowSeq) -> Self {
        Self {
            seq: Some(seq),
            membership: None,
            cache: None,
        }
    }

    fn with_membership(mut self, ids: Arc<NestedIdQuery>) -> Self {
        self.membership = Some(ids);
        self
    }

    pub(crate) fn with_cache(mut self, cache: Arc<RowCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Next matching row, or `None` when exhausted (or after close).
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let seq = match self.seq.as_mut() {
            Some(seq) => seq,
            None => return Ok(None),
        };
        loop {
            let row = match seq.next_row()? {
                Some(row) => row,
                None => return Ok(None),
            };
            if let Some(ids) = &self.membership {
                if !ids.contains(row.id()) {
                    continue;
                }
            }
            if let Some(cache) = &self.cache {
                cache.offer(Arc::new(row.clone()));
            }
            return Ok(Some(row));
        }
    }

    /// Release the underlying query resources. Idempotent; never called
    /// automatically.
    pub fn close(&mut self) {
        if let Some(mut seq) = self.seq.take() {
            seq.close();
        }
    }

    /// Drain the remaining rows and close.
    pub fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        self.close();
        Ok(rows)
    }
}

/// A windowed query's result: the lazy cursor plus the count consistent
/// with the fetch path that produced it.
pub struct FeatureQueryResult {
    pub cursor: FeatureCursor,
    pub count: u64,
}

impl std::fmt::Debug for FeatureQueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureQueryResult")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

/// Turn a spatial id set into bounded row retrieval (see module docs for
/// the two paths).
pub(crate) fn fetch_rows(
    source: &Arc<dyn FeatureSource>,
    ids: NestedIdQuery,
    options: &QueryOptions,
    cache: Option<Arc<RowCache>>,
) -> Result<FeatureQueryResult> {
    let extra_params = options
        .predicate
        .as_ref()
        .map_or(0, |p| p.args.len());
    let base = RowQuery {
        columns: options.columns.clone(),
        distinct: options.distinct,
        id_list: None,
        predicate: options.predicate.clone(),
    };

    if !ids.above_limit(extra_params, source.max_bind_parameters()) {
        let count = ids.len() as u64;
        let mut query = base;
        query.id_list = Some(ids.to_id_list(source.id_column()));
        let seq = source.query(&query)?;
        let mut cursor = FeatureCursor::new(seq);
        if let Some(cache) = cache {
            cursor = cursor.with_cache(cache);
        }
        return Ok(FeatureQueryResult { cursor, count });
    }

    tracing::debug!(
        table = source.table_name(),
        ids = ids.len(),
        limit = source.max_bind_parameters(),
        "id set above bound-parameter ceiling; using post-filter fetch"
    );
    let ids = Arc::new(ids);

    // Counting pass: predicate-only query, tallied through membership.
    let mut count = 0u64;
    let mut seq = source.query(&base)?;
    while let Some(row) = seq.next_row()? {
        if ids.contains(row.id()) {
            count += 1;
        }
    }
    seq.close();

    let seq = source.query(&base)?;
    let mut cursor = FeatureCursor::new(seq).with_membership(ids);
    if let Some(cache) = cache {
        cursor = cursor.with_cache(cache);
    }
    Ok(FeatureQueryResult { cursor, count })
}
