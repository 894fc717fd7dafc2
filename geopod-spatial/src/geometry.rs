//! Geometry decoding seam.
//!
//! The container stores geometries as opaque blobs; a [`GeometryCodec`]
//! turns a blob into a typed geometry plus, when the encoding header
//! carries one, a precomputed envelope. The index layers never look inside
//! a blob themselves.
//!
//! [`WktCodec`] is the reference codec: UTF-8 WKT bytes, no header
//! envelope, so extraction always falls back to the recursive walk.

use crate::envelope::Envelope;
use crate::error::{Result, SpatialError};
use geo_types::Geometry;

/// Result of decoding one geometry blob.
#[derive(Debug, Clone)]
pub struct DecodedGeometry {
    /// The decoded geometry; `None` for an encoded-null.
    pub geometry: Option<Geometry<f64>>,

    /// Envelope read from the encoding header, when present.
    pub envelope: Option<Envelope>,
}

impl DecodedGeometry {
    /// An encoded-null geometry.
    pub fn null() -> Self {
        Self {
            geometry: None,
            envelope: None,
        }
    }
}

/// Decodes geometry blobs of one encoding.
pub trait GeometryCodec: Send + Sync {
    /// Decode a blob.
    ///
    /// Errors signal a corrupt/undecodable blob; batch indexing treats
    /// them as a skip, not a failure.
    fn decode(&self, blob: &[u8]) -> Result<DecodedGeometry>;
}

/// Envelope of a decoded geometry, per the extraction rule.
///
/// Header envelope when present (O(1)); recursive computation otherwise;
/// `None` when the geometry is null or empty — the row is not indexable
/// and any existing entry for it must be removed.
pub fn extract_envelope(decoded: &DecodedGeometry) -> Option<Envelope> {
    if let Some(envelope) = decoded.envelope {
        return Some(envelope);
    }
    decoded.geometry.as_ref().and_then(Envelope::from_geometry)
}

/// Reference codec for UTF-8 WKT blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WktCodec;

impl GeometryCodec for WktCodec {
    fn decode(&self, blob: &[u8]) -> Result<DecodedGeometry> {
        if blob.is_empty() {
            return Ok(DecodedGeometry::null());
        }
        let text = std::str::from_utf8(blob)
            .map_err(|e| SpatialError::Decode(format!("invalid UTF-8: {}", e)))?;
        let geometry = parse_wkt(text)?;
        Ok(DecodedGeometry {
            geometry: Some(geometry),
            envelope: None,
        })
    }
}

/// Parse WKT text to a geo-types Geometry.
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::from_str(text)
        .map_err(|e| SpatialError::Decode(format!("{:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| SpatialError::Decode(format!("{:?}", e)))
        })
}
