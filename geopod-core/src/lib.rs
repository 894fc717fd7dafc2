//! Core container contracts for GeoPod.
//!
//! A GeoPod container is an embedded relational file whose feature tables
//! carry geometry-valued blob columns. This crate defines the narrow
//! capability surface the rest of the system — most importantly the
//! spatial index subsystem in `geopod-spatial` — consumes:
//!
//! - [`Value`] / [`Row`]: the container's storage classes and feature rows
//! - [`FeatureSource`]: chunked scans, fetch-by-id, and the combined
//!   IN-list + predicate query primitive
//! - [`RangeIndexSupport`]: the trigger-maintained native range-shadow
//!   capability
//! - [`RowSeq`]: explicitly closeable lazy row sequences
//! - [`MemoryFeatureTable`]: the in-memory reference container
//!
//! Platform database bindings implement these traits; nothing above this
//! crate knows which binding is in play.

pub mod error;
pub mod memory;
pub mod source;
pub mod value;

pub use error::{Error, Result};
pub use memory::MemoryFeatureTable;
pub use source::{
    BoxedRowSeq, EnvelopeFn, FeatureSource, IdList, Predicate, RangeIndexSupport, RowQuery,
    RowSeq, VecRowSeq, DEFAULT_MAX_BIND_PARAMETERS,
};
pub use value::{Row, Value};
