//! Coordinate Reference System identifiers.
//!
//! A [`Crs`] is an opaque, normalized identifier. Resolving it into actual
//! projection math is the job of the `projection` crate; equality here is
//! purely textual after normalization, which is what the compositing stage
//! relies on for its "every input shares one CRS" contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized CRS identifier.
///
/// Accepts formats like:
/// - "EPSG:4326" / "epsg:4326"
/// - "CRS:84" (treated as EPSG:4326)
/// - a raw PROJ string ("+proj=longlat +datum=WGS84 +no_defs")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// A code from the EPSG registry.
    Epsg(u32),
    /// A PROJ definition string, whitespace-normalized.
    Proj(String),
}

impl Crs {
    /// WGS84 geographic coordinates (lon/lat in degrees).
    pub const WGS84: Crs = Crs::Epsg(4326);

    /// Parse a CRS string.
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CrsParseError::Empty);
        }

        if trimmed.starts_with('+') {
            let normalized = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
            return Ok(Crs::Proj(normalized));
        }

        let upper = trimmed.to_uppercase();
        if upper == "CRS:84" || upper == "OGC:CRS84" {
            return Ok(Crs::WGS84);
        }

        if let Some(code) = upper.strip_prefix("EPSG:") {
            return code
                .trim()
                .parse::<u32>()
                .map(Crs::Epsg)
                .map_err(|_| CrsParseError::InvalidCode(s.to_string()));
        }

        Err(CrsParseError::Unsupported(s.to_string()))
    }

    /// The EPSG code, if this CRS is registry-backed.
    pub fn epsg_code(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Proj(_) => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Proj(def) => write!(f, "{}", def),
        }
    }
}

impl FromStr for Crs {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Crs::parse(s)
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Crs::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrsParseError {
    #[error("CRS string is empty")]
    Empty,

    #[error("Invalid EPSG code in CRS: {0}")]
    InvalidCode(String),

    #[error("Unsupported CRS: {0}")]
    Unsupported(String),
}
