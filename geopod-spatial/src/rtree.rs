//! Native range index.
//!
//! The alternative backend: a shadow multidimensional range structure the
//! storage engine itself maintains through insert/update/delete triggers
//! on the source table. There is no staleness bookkeeping — whenever the
//! shadow exists it is consistent by construction, at the price of
//! requiring the runtime to register scalar computation callbacks that
//! populate the envelope columns. Runtimes that cannot do so get an
//! explicit unsupported-operation error at creation time, never a silent
//! fallback.

use crate::config::IndexConfig;
use crate::envelope::Envelope;
use crate::error::{Result, SpatialError};
use crate::geometry::{extract_envelope, GeometryCodec};
use crate::id_query::NestedIdQuery;
use crate::transform::{resolve_region, TransformService};
use geopod_core::{EnvelopeFn, FeatureSource, RangeIndexSupport};
use std::sync::Arc;

/// Trigger-maintained range index over one feature table.
pub struct NativeRangeIndex {
    source: Arc<dyn FeatureSource>,
    range: Arc<dyn RangeIndexSupport>,
    codec: Arc<dyn GeometryCodec>,
    config: IndexConfig,
}

impl NativeRangeIndex {
    /// Create a handle over a table and its range capability.
    pub fn new(
        source: Arc<dyn FeatureSource>,
        range: Arc<dyn RangeIndexSupport>,
        codec: Arc<dyn GeometryCodec>,
    ) -> Self {
        Self {
            source,
            range,
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

    /// Whether the shadow structure currently exists.
    pub fn exists(&self) -> bool {
        self.range.range_shadow_exists()
    }

    /// Consistency is structural: the shadow is trigger-maintained, so it
    /// is consistent exactly when it exists.
    pub fn is_consistent(&self) -> bool {
        self.exists()
    }

    /// Create the shadow structure and its maintenance triggers,
    /// populating it from the table's current content.
    ///
    /// No-op if it already exists. Fails with
    /// [`SpatialError::Unsupported`] when the runtime cannot register the
    /// scalar callbacks the triggers need.
    pub fn create(&self) -> Result<()> {
        let table = self.table_name();
        if self.exists() {
            tracing::debug!(table, "range shadow already present");
            return Ok(());
        }
        if !self.range.supports_scalar_functions() {
            return Err(SpatialError::Unsupported(format!(
                "runtime cannot register scalar functions; refusing to create an unmaintainable range index for table {table}"
            )));
        }

        let codec = Arc::clone(&self.codec);
        let envelope_fn: Arc<EnvelopeFn> = Arc::new(move |blob: &[u8]| {
            codec
                .decode(blob)
                .ok()
                .as_ref()
                .and_then(extract_envelope)
                .map(|e| [e.min_x, e.min_y, e.max_x, e.max_y])
        });
        self.range.create_range_shadow(envelope_fn)?;
        tracing::info!(table, "range shadow created");
        Ok(())
    }

    /// Drop the shadow structure and its triggers.
    pub fn delete(&self) -> Result<()> {
        self.range.drop_range_shadow()?;
        tracing::debug!(table = self.table_name(), "range shadow dropped");
        Ok(())
    }

    /// Feature ids whose shadow envelope intersects `region` within ε,
    /// deduplicated in result order. `region = None` selects everything in
    /// the shadow.
    ///
    /// Errors with [`SpatialError::NotCreated`] when the shadow was never
    /// built for this table — an empty result would be indistinguishable
    /// from "no matches".
    pub fn query_ids(
        &self,
        region: Option<&Envelope>,
        region_srs: Option<i64>,
        transforms: Option<&Arc<dyn TransformService>>,
    ) -> Result<NestedIdQuery> {
        let table = self.table_name();
        if !self.exists() {
            return Err(SpatialError::NotCreated(format!(
                "native range index was never created for table {table}"
            )));
        }

        let window = match region {
            Some(r) => resolve_region(r, region_srs, self.source.srs_id(), transforms)?
                .expanded(self.config.tolerance),
            None => Envelope::new(
                f64::NEG_INFINITY,
                f64::NEG_INFINITY,
                f64::INFINITY,
                f64::INFINITY,
            ),
        };

        let ids = self
            .range
            .range_query(window.min_x, window.min_y, window.max_x, window.max_y)?;
        Ok(NestedIdQuery::from_ids(ids))
    }

    /// Number of shadow entries intersecting `region` (everything when
    /// `None`).
    pub fn count(
        &self,
        region: Option<&Envelope>,
        region_srs: Option<i64>,
        transforms: Option<&Arc<dyn TransformService>>,
    ) -> Result<u64> {
        Ok(self.query_ids(region, region_srs, transforms)?.len() as u64)
    }
}
