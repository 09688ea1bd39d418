//! Region geometry and the bounding-box intersection test.
//!
//! Regions come from a GeoJSON FeatureCollection (for example Natural Earth
//! admin-0 countries exported as GeoJSON). Features are selected by a name
//! property and unioned into a single multipolygon. Event rasters are tested
//! by their bounding rectangle only, so a raster whose extent touches a
//! region is kept even if all of its valid cells lie outside.

use std::path::Path;

use flood_common::{BoundingBox, Crs};
use geo::{coord, BooleanOps, Intersects, LineString, MultiPolygon, Polygon, Rect};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{IngestionError, Result};

/// Name properties tried in order when none are configured.
pub const DEFAULT_NAME_FIELDS: &[&str] = &["ADMIN", "NAME"];

/// A named region as one multipolygon in a known CRS.
#[derive(Debug, Clone)]
pub struct RegionGeometry {
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
    /// Names that matched at least one feature
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    crs: Option<NamedCrs>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

/// Legacy GeoJSON `crs` member: `{"type": "name", "properties": {"name": ...}}`.
#[derive(Debug, Deserialize)]
struct NamedCrs {
    properties: NamedCrsProperties,
}

#[derive(Debug, Deserialize)]
struct NamedCrsProperties {
    name: String,
}

impl RegionGeometry {
    /// Load a GeoJSON file and select `names`. See [`RegionGeometry::from_geojson`].
    pub fn from_file<S: AsRef<str>>(path: &Path, names: &[S], name_fields: &[S]) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_geojson(&json, names, name_fields).map_err(|e| match e {
            IngestionError::RegionNotFound { names, .. } => IngestionError::RegionNotFound {
                names,
                path: path.display().to_string(),
            },
            other => other,
        })
    }

    /// Parse a FeatureCollection and union the features named in `names`.
    ///
    /// The first entry of `name_fields` that appears as a property on any
    /// feature is used as the name column. An empty `name_fields` means
    /// [`DEFAULT_NAME_FIELDS`].
    pub fn from_geojson<S: AsRef<str>>(json: &str, names: &[S], name_fields: &[S]) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(json)
            .map_err(|e| IngestionError::InvalidRegion(format!("GeoJSON parse error: {}", e)))?;

        let crs = match &collection.crs {
            Some(named) => parse_crs_name(&named.properties.name)?,
            None => Crs::WGS84,
        };

        let fields: Vec<&str> = if name_fields.is_empty() {
            DEFAULT_NAME_FIELDS.to_vec()
        } else {
            name_fields.iter().map(AsRef::as_ref).collect()
        };
        let field = fields
            .iter()
            .copied()
            .find(|f| {
                collection
                    .features
                    .iter()
                    .any(|feat| feat.properties.as_ref().is_some_and(|p| p.contains_key(*f)))
            })
            .ok_or_else(|| {
                IngestionError::InvalidRegion(format!("no name property among {:?}", fields))
            })?;

        let wanted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        let mut geometry = MultiPolygon::new(vec![]);
        let mut matched: Vec<String> = Vec::new();

        for feature in &collection.features {
            let Some(name) = feature
                .properties
                .as_ref()
                .and_then(|p| p.get(field))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !wanted.contains(&name) {
                continue;
            }
            let Some(geom) = &feature.geometry else {
                continue;
            };

            let polygons = to_multipolygon(geom)?;
            geometry = geometry.union(&polygons);
            if !matched.iter().any(|m| m == name) {
                matched.push(name.to_string());
            }
        }

        if matched.is_empty() {
            return Err(IngestionError::RegionNotFound {
                names: wanted.iter().map(|s| s.to_string()).collect(),
                path: "<inline>".to_string(),
            });
        }

        let missing: Vec<&str> = wanted
            .iter()
            .copied()
            .filter(|w| !matched.iter().any(|m| m == w))
            .collect();
        if !missing.is_empty() {
            info!(missing = ?missing, field = field, "Some region names matched no feature");
        }
        debug!(
            field = field,
            matched = ?matched,
            polygons = geometry.0.len(),
            "Built region geometry"
        );

        Ok(Self {
            geometry,
            crs,
            names: matched,
        })
    }

    /// Bounding-rectangle intersection with the region.
    pub fn intersects_bbox(&self, bbox: &BoundingBox) -> bool {
        intersects(bbox, self)
    }
}

/// Whether the rectangle `bbox` (in the region's CRS) touches `region`.
pub fn intersects(bbox: &BoundingBox, region: &RegionGeometry) -> bool {
    if !bbox.is_finite() {
        return false;
    }
    let rect = Rect::new(
        coord! { x: bbox.min_x, y: bbox.min_y },
        coord! { x: bbox.max_x, y: bbox.max_y },
    );
    region.geometry.intersects(&rect)
}

fn parse_crs_name(name: &str) -> Result<Crs> {
    if name.ends_with("CRS84") {
        return Ok(Crs::WGS84);
    }
    let name = match name.rsplit_once("EPSG::") {
        Some((_, code)) => format!("EPSG:{}", code),
        None => name.to_string(),
    };
    Crs::parse(&name).map_err(|e| IngestionError::InvalidRegion(e.to_string()))
}

fn to_multipolygon(geometry: &Geometry) -> Result<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon { coordinates } => Ok(MultiPolygon::new(vec![to_polygon(coordinates)?])),
        Geometry::MultiPolygon { coordinates } => Ok(MultiPolygon::new(
            coordinates
                .iter()
                .map(|rings| to_polygon(rings))
                .collect::<Result<Vec<_>>>()?,
        )),
        Geometry::Unsupported => Err(IngestionError::InvalidRegion(
            "only Polygon and MultiPolygon geometries are supported".to_string(),
        )),
    }
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| to_ring(ring));
    let exterior = rings
        .next()
        .ok_or_else(|| IngestionError::InvalidRegion("polygon without rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn to_ring(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(coord! { x: *x, y: *y }),
            _ => Err(IngestionError::InvalidRegion(format!(
                "position needs two coordinates, got {}",
                p.len()
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}
