//! Spatial index configuration.

use serde::{Deserialize, Serialize};

/// Default rows per chunk during a full reindex.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default envelope-intersection tolerance.
///
/// Absorbs floating-point boundary error when a query window edge lands
/// exactly on an indexed envelope edge.
pub const DEFAULT_TOLERANCE: f64 = 1e-14;

/// Configuration shared by both index backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Rows fetched per chunk during a full reindex. Chunking bounds both
    /// memory and write-lock duration; this is never one long scan.
    pub chunk_size: usize,

    /// Intersection tolerance ε applied on every envelope axis.
    pub tolerance: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl IndexConfig {
    /// Set the reindex chunk size (clamped to at least 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the intersection tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.tolerance, 1e-14);
    }

    #[test]
    fn test_chunk_size_floor() {
        assert_eq!(IndexConfig::default().with_chunk_size(0).chunk_size, 1);
    }
}
