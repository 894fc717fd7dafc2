//! Narrow row-store capability contract.
//!
//! The spatial index core never talks to a concrete database binding; it
//! depends on the traits here. A binding provides chunked scans,
//! fetch-by-id, and one query primitive that accepts a pre-rendered IN-list
//! fragment *combined with* an arbitrary additional predicate — the shape
//! the index layers need to stay under the engine's bound-parameter
//! ceiling.
//!
//! Row sequences are explicitly closeable. Dropping a sequence without
//! calling [`RowSeq::close`] leaks whatever statement or cursor the binding
//! holds underneath; release is never automatic.

use crate::error::Result;
use crate::value::{Row, Value};
use std::sync::Arc;

/// Bound-parameter ceiling of the typical embedded engine.
///
/// Bindings with a different compile-time limit override
/// [`FeatureSource::max_bind_parameters`].
pub const DEFAULT_MAX_BIND_PARAMETERS: usize = 999;

/// An attribute predicate already translated to SQL plus its arguments.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    /// SQL fragment with `?` placeholders, e.g. `"name = ? AND height > ?"`.
    pub sql: String,
    /// One argument per placeholder, in placeholder order.
    pub args: Vec<Value>,
}

impl Predicate {
    /// Create a predicate from a fragment and its arguments.
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

/// A pre-rendered IN-list fragment and its arguments.
///
/// Produced by the spatial layer's id-query builder; consumed verbatim by
/// the binding. The fragment and the argument list agree on ordering.
#[derive(Debug, Clone)]
pub struct IdList {
    /// Fragment such as `"fid IN (?, ?, ?)"`.
    pub sql: String,
    /// The ids, one per placeholder, in fragment order.
    pub args: Vec<Value>,
}

/// One query over a feature table.
///
/// Collapses the historical overload surface (bbox/predicate/projection
/// combinations) into a single options value; absent fields mean
/// "unconstrained".
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    /// Columns to project; `None` selects all columns.
    pub columns: Option<Vec<String>>,
    /// Deduplicate projected rows.
    pub distinct: bool,
    /// Restrict to an explicit id set (AND-combined with `predicate`).
    pub id_list: Option<IdList>,
    /// Additional attribute predicate (AND-combined with `id_list`).
    pub predicate: Option<Predicate>,
}

/// A lazily evaluated, explicitly closeable sequence of rows.
pub trait RowSeq: Send {
    /// Next row, or `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release the underlying statement/cursor. Idempotent.
    fn close(&mut self);
}

/// Boxed row sequence handed across the trait boundary.
pub type BoxedRowSeq = Box<dyn RowSeq>;

/// Read surface of one feature table inside a container.
pub trait FeatureSource: Send + Sync {
    /// Table name within the container.
    fn table_name(&self) -> &str;

    /// Name of the integer primary-key column.
    fn id_column(&self) -> &str;

    /// Name of the geometry blob column.
    fn geometry_column(&self) -> &str;

    /// Spatial reference system id of the geometry column.
    fn srs_id(&self) -> i64;

    /// Monotonic content-modification stamp, advanced by the table owner
    /// on any write.
    fn last_modified(&self) -> i64;

    /// Total row count.
    fn row_count(&self) -> Result<u64>;

    /// Fetch one row by id.
    fn fetch(&self, feature_id: i64) -> Result<Option<Row>>;

    /// One chunk of a full scan, in stable id order.
    fn scan_chunk(&self, limit: usize, offset: u64) -> Result<Vec<Row>>;

    /// Run a [`RowQuery`] and return a lazy sequence.
    fn query(&self, query: &RowQuery) -> Result<BoxedRowSeq>;

    /// Maximum bound parameters one statement may carry.
    fn max_bind_parameters(&self) -> usize {
        DEFAULT_MAX_BIND_PARAMETERS
    }
}

/// Envelope computation callback handed to the binding when a native range
/// shadow is created: geometry blob in, `[min_x, min_y, max_x, max_y]` out
/// (or `None` for null/empty/undecodable geometries).
pub type EnvelopeFn = dyn Fn(&[u8]) -> Option<[f64; 4]> + Send + Sync;

/// Native range-index capability of a container binding.
///
/// A binding that supports it keeps a shadow structure of four envelope
/// bounds plus a row-id back-reference, populated at creation time and
/// maintained by the engine's own insert/update/delete triggers — the
/// shadow is transactionally consistent whenever it exists, with no
/// separate staleness bookkeeping.
pub trait RangeIndexSupport: Send + Sync {
    /// Whether the runtime can register the scalar computation callbacks
    /// that populate the shadow's envelope columns.
    fn supports_scalar_functions(&self) -> bool;

    /// Create and populate the shadow, installing the maintenance
    /// triggers. Fails if scalar callbacks are unavailable.
    fn create_range_shadow(&self, envelope_fn: Arc<EnvelopeFn>) -> Result<()>;

    /// Drop the shadow and its triggers. Idempotent.
    fn drop_range_shadow(&self) -> Result<()>;

    /// Whether the shadow currently exists.
    fn range_shadow_exists(&self) -> bool;

    /// Row ids whose shadow entry satisfies
    /// `min_x <= q_max_x AND max_x >= q_min_x AND min_y <= q_max_y AND max_y >= q_min_y`.
    fn range_query(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Vec<i64>>;
}

/// In-memory row sequence over an already-materialized result set.
///
/// The reference implementation used by the memory container; bindings
/// with real cursors implement [`RowSeq`] directly.
pub struct VecRowSeq {
    rows: std::vec::IntoIter<Row>,
    closed: bool,
}

impl VecRowSeq {
    /// Wrap a materialized result set.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
            closed: false,
        }
    }
}

impl RowSeq for VecRowSeq {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(crate::error::Error::closed("VecRowSeq"));
        }
        Ok(self.rows.next())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
