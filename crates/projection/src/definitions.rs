//! PROJ.4 definition lookup.

use flood_common::Crs;

use crate::error::{ProjectionError, Result};

/// Definitions missing from the bundled EPSG table.
///
/// EPSG:27704 is the Equi7 Europe grid the JRC flood depth tiles ship in.
const EXTRA_DEFINITIONS: &[(u32, &str)] = &[(
    27704,
    "+proj=aeqd +lat_0=53 +lon_0=24 +x_0=5837287.81977 +y_0=2121415.69617 +datum=WGS84 +units=m +no_defs",
)];

/// Get the PROJ.4 string for a CRS.
///
/// Raw PROJ strings are returned as-is. EPSG codes are looked up in the
/// `crs-definitions` database first, then in a small local table.
pub fn proj_definition(crs: &Crs) -> Result<String> {
    match crs {
        Crs::Proj(def) => Ok(def.clone()),
        Crs::Epsg(code) => {
            let bundled = u16::try_from(*code)
                .ok()
                .and_then(crs_definitions::from_code)
                .map(|def| def.proj4.to_string());

            bundled
                .or_else(|| {
                    EXTRA_DEFINITIONS
                        .iter()
                        .find(|(c, _)| c == code)
                        .map(|(_, def)| def.to_string())
                })
                .ok_or_else(|| ProjectionError::UnknownCrs(crs.to_string()))
        }
    }
}

/// Check if a CRS uses geographic (lon/lat degree) coordinates.
pub fn is_geographic(crs: &Crs) -> bool {
    match proj_definition(crs) {
        Ok(def) => def.contains("+proj=longlat") || def.contains("+proj=latlong"),
        Err(_) => matches!(crs, Crs::Epsg(4326) | Crs::Epsg(4269)),
    }
}
