//! Coordinate reference transforms.
//!
//! A query window may arrive in a different reference system than the
//! table's geometry column. The transform service turns a pair of CRS ids
//! into a reusable envelope transform; the index layers apply it before
//! touching any index structure. Platform deployments back this with their
//! projection library; [`SameCrs`] serves single-CRS containers.

use crate::envelope::Envelope;
use crate::error::{Result, SpatialError};
use std::sync::Arc;

/// Reusable envelope transform between two fixed reference systems.
pub type EnvelopeTransform = Box<dyn Fn(&Envelope) -> Envelope + Send + Sync>;

/// Produces transforms between coordinate reference systems.
pub trait TransformService: Send + Sync {
    /// A transform mapping envelopes from `from` into `to`.
    fn envelope_transform(&self, from: i64, to: i64) -> Result<EnvelopeTransform>;
}

/// Transform service for containers that only ever see one CRS.
///
/// Identity when the ids match; explicit error otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameCrs;

impl TransformService for SameCrs {
    fn envelope_transform(&self, from: i64, to: i64) -> Result<EnvelopeTransform> {
        if from == to {
            Ok(Box::new(|env: &Envelope| *env))
        } else {
            Err(SpatialError::Transform(format!(
                "no transform registered from srs {from} to srs {to}"
            )))
        }
    }
}

/// Resolve a query region into the table's reference system.
///
/// `region_srs = None` means "already in the table's CRS". A differing CRS
/// without a transform service is an explicit error, never a silent
/// pass-through.
pub(crate) fn resolve_region(
    region: &Envelope,
    region_srs: Option<i64>,
    table_srs: i64,
    transforms: Option<&Arc<dyn TransformService>>,
) -> Result<Envelope> {
    match region_srs {
        None => Ok(*region),
        Some(srs) if srs == table_srs => Ok(*region),
        Some(srs) => {
            let service = transforms.ok_or_else(|| {
                SpatialError::Transform(format!(
                    "query region is in srs {srs} but table uses srs {table_srs} and no transform service is configured"
                ))
            })?;
            let transform = service.envelope_transform(srs, table_srs)?;
            Ok(transform(region))
        }
    }
}
