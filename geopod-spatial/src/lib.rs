//! Spatial indexing for GeoPod containers.
//!
//! A GeoPod feature table stores geometries as opaque blobs; without an
//! index, every windowed query decodes and tests every row. This crate
//! maintains two derived index backends over a table and answers
//! bounding-box queries through whichever is prioritized:
//!
//! - **Grid index**: a persisted envelope per feature row plus a table
//!   registry tracking freshness against the source's modification stamp.
//!   Rebuilt in chunks, cancellable, tolerant of bad rows.
//! - **Native range index**: a shadow range structure the storage engine
//!   maintains with its own triggers — transactionally consistent whenever
//!   it exists, but only on runtimes that can register scalar callbacks.
//!
//! ```text
//!                    FeatureIndexSession
//!          ┌───────────────┴───────────────┐
//!          ▼                               ▼
//!     GridIndex                    NativeRangeIndex
//!   (IndexStore: registry         (RangeIndexSupport:
//!    + envelope entries)           trigger-maintained shadow)
//!          │                               │
//!          └───────────────┬───────────────┘
//!                          ▼
//!                   NestedIdQuery
//!            (dedup ids, parameter ceiling)
//!                          │
//!                          ▼
//!              fetch: IN-clause | post-filter
//!                          │
//!                          ▼
//!              RowCache (single-flight)
//!                          │
//!                          ▼
//!              FeatureCursor (lazy, closeable)
//! ```
//!
//! # Modules
//!
//! - [`config`]: index configuration
//! - [`envelope`]: envelopes and recursive extraction
//! - [`geometry`]: geometry codec seam and the WKT reference codec
//! - [`id_query`]: nested ID query builder
//! - [`store`]: persisted index state (registry + entries)
//! - [`grid`]: grid index backend
//! - [`rtree`]: native range index backend
//! - [`coordinator`]: backend selection and the per-table session
//! - [`row_cache`]: single-flight row cache
//! - [`query`]: query options and cursors
//! - [`transform`]: CRS transform seam
//! - [`error`]: error types

pub mod config;
pub mod coordinator;
pub mod envelope;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod id_query;
pub mod query;
pub mod row_cache;
pub mod rtree;
pub mod store;
pub mod transform;

pub use config::{IndexConfig, DEFAULT_CHUNK_SIZE, DEFAULT_TOLERANCE};
pub use coordinator::{BackendKind, FeatureIndexSession, SpatialBackend};
pub use envelope::Envelope;
pub use error::{Result, SpatialError};
pub use geometry::{extract_envelope, parse_wkt, DecodedGeometry, GeometryCodec, WktCodec};
pub use grid::{CancelToken, GridIndex, IndexOutcome};
pub use id_query::NestedIdQuery;
pub use query::{FeatureCursor, FeatureQueryResult, QueryOptions};
pub use row_cache::{CachedRow, Fetch, RowCache};
pub use rtree::NativeRangeIndex;
pub use store::{IndexEntry, IndexStore, MemoryIndexStore, TableRegistryRecord};
pub use transform::{EnvelopeTransform, SameCrs, TransformService};
