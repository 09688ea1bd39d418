//! Point and bounds transformation between two CRSs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use flood_common::{BoundingBox, Crs};
use proj4rs::proj::Proj;
use tracing::debug;

use crate::definitions::{is_geographic, proj_definition};
use crate::error::{ProjectionError, Result};

enum Engine {
    /// Source and target are the same CRS; points pass through untouched.
    Identity,
    Proj4 {
        source: Box<Proj>,
        target: Box<Proj>,
        /// proj4rs works in radians for geographic CRSs.
        source_is_geographic: bool,
        target_is_geographic: bool,
    },
}

/// A resolved transformation from one CRS to another.
pub struct CrsTransformer {
    from: Crs,
    to: Crs,
    engine: Engine,
}

impl CrsTransformer {
    /// Build a transformer between two CRSs.
    ///
    /// Equal CRSs produce an identity transformer without touching the
    /// definition database.
    pub fn new(from: &Crs, to: &Crs) -> Result<Self> {
        if from == to {
            return Ok(Self {
                from: from.clone(),
                to: to.clone(),
                engine: Engine::Identity,
            });
        }

        let source = parse_proj(from)?;
        let target = parse_proj(to)?;

        Ok(Self {
            from: from.clone(),
            to: to.clone(),
            engine: Engine::Proj4 {
                source: Box::new(source),
                target: Box::new(target),
                source_is_geographic: is_geographic(from),
                target_is_geographic: is_geographic(to),
            },
        })
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.engine, Engine::Identity)
    }

    /// Transform a single point.
    ///
    /// Returns `None` when the point has no image in the target CRS (outside
    /// the projection's domain, or the engine produced a non-finite result).
    #[inline]
    pub fn transform(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match &self.engine {
            Engine::Identity => Some((x, y)),
            Engine::Proj4 {
                source,
                target,
                source_is_geographic,
                target_is_geographic,
            } => {
                let mut point = if *source_is_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };

                proj4rs::transform::transform(source, target, &mut point).ok()?;

                let (out_x, out_y) = if *target_is_geographic {
                    (point.0.to_degrees(), point.1.to_degrees())
                } else {
                    (point.0, point.1)
                };

                if out_x.is_finite() && out_y.is_finite() {
                    Some((out_x, out_y))
                } else {
                    None
                }
            }
        }
    }

    /// Transform bounds by sampling `densify` points along every edge.
    ///
    /// Edge sampling catches the curvature of non-linear projections that a
    /// four-corner transform would miss. Points that fail to transform are
    /// skipped; if all of them fail the call errors.
    pub fn transform_bounds(&self, bounds: &BoundingBox, densify: usize) -> Result<BoundingBox> {
        if self.is_identity() {
            return Ok(*bounds);
        }

        let steps = densify.max(1);
        let mut out = BoundingBox::empty();

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = bounds.min_x + t * bounds.width();
            let y = bounds.min_y + t * bounds.height();

            let samples = [
                (x, bounds.min_y),
                (x, bounds.max_y),
                (bounds.min_x, y),
                (bounds.max_x, y),
            ];
            for (sx, sy) in samples {
                if let Some((tx, ty)) = self.transform(sx, sy) {
                    out = out.include_point(tx, ty);
                }
            }
        }

        if !out.is_finite() {
            return Err(ProjectionError::EmptyBounds {
                from: self.from.to_string(),
                to: self.to.to_string(),
            });
        }
        Ok(out)
    }
}

impl fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsTransformer")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("identity", &self.is_identity())
            .finish()
    }
}

fn parse_proj(crs: &Crs) -> Result<Proj> {
    let def = proj_definition(crs)?;
    Proj::from_proj_string(&def).map_err(|e| ProjectionError::InvalidDefinition {
        crs: crs.to_string(),
        message: format!("{:?}", e),
    })
}

/// Cache of transformers keyed by `(from, to)`.
///
/// Parsing PROJ definitions is far more expensive than applying them, and a
/// batch run keeps asking for the same handful of CRS pairs.
#[derive(Default)]
pub struct TransformerCache {
    cache: RwLock<HashMap<(Crs, Crs), Arc<CrsTransformer>>>,
}

impl TransformerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the transformer from `from` to `to`.
    pub fn get(&self, from: &Crs, to: &Crs) -> Result<Arc<CrsTransformer>> {
        let key = (from.clone(), to.clone());

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(transformer) = cache.get(&key) {
                return Ok(transformer.clone());
            }
        }

        debug!(from = %from, to = %to, "Creating CRS transformer");
        let transformer = Arc::new(CrsTransformer::new(from, to)?);

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, transformer.clone());
        Ok(transformer)
    }

    /// Number of cached transformers.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = CrsTransformer::new(&Crs::WGS84, &Crs::WGS84).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(12.5, -3.0), Some((12.5, -3.0)));
    }

    #[test]
    fn test_wgs84_to_web_mercator() {
        let t = CrsTransformer::new(&Crs::WGS84, &Crs::Epsg(3857)).unwrap();
        let (x, y) = t.transform(0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);

        let (x, _) = t.transform(180.0, 0.0).unwrap();
        assert!((x - 20037508.342789244).abs() < 1.0);
    }

    #[test]
    fn test_roundtrip_through_equi7() {
        let fwd = CrsTransformer::new(&Crs::WGS84, &Crs::Epsg(27704)).unwrap();
        let inv = CrsTransformer::new(&Crs::Epsg(27704), &Crs::WGS84).unwrap();

        let (x, y) = fwd.transform(2.35, 48.85).unwrap();
        let (lon, lat) = inv.transform(x, y).unwrap();
        assert!((lon - 2.35).abs() < 1e-6);
        assert!((lat - 48.85).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_crs_fails() {
        let err = CrsTransformer::new(&Crs::WGS84, &Crs::Epsg(999_999)).unwrap_err();
        assert!(matches!(err, ProjectionError::UnknownCrs(_)));
    }

    #[test]
    fn test_cache_reuses_transformers() {
        let cache = TransformerCache::new();
        let a = cache.get(&Crs::WGS84, &Crs::Epsg(3857)).unwrap();
        let b = cache.get(&Crs::WGS84, &Crs::Epsg(3857)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
