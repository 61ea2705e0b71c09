//! Coordinate reference system identifiers.
//!
//! Only EPSG codes are modelled. Layers announce their CRS through the
//! legacy `GeoJSON` `crs` member using one of several naming styles, or
//! through a shapefile's `.prj` WKT; both are normalised here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// EPSG code for WGS84 geographic longitude/latitude.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code for spherical Web Mercator.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// EPSG code for the Ordnance Survey British National Grid.
pub const EPSG_BRITISH_NATIONAL_GRID: u32 = 27_700;

/// A coordinate reference system identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// WGS84 longitude/latitude, the common reference every layer is
    /// reprojected to.
    pub const WGS84: Self = Self { epsg: EPSG_WGS84 };

    /// Creates a CRS from an EPSG code.
    #[must_use]
    pub const fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Returns the EPSG code.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        self.epsg
    }

    /// Whether this is WGS84 longitude/latitude.
    #[must_use]
    pub const fn is_wgs84(self) -> bool {
        self.epsg == EPSG_WGS84
    }

    /// Parses any of the CRS naming styles found in the wild:
    ///
    /// - `EPSG:27700`, `epsg:27700`, `27700`
    /// - `urn:ogc:def:crs:EPSG::27700`, `urn:ogc:def:crs:EPSG:6.6:27700`
    /// - `urn:ogc:def:crs:OGC:1.3:CRS84` / `CRS84` (WGS84 lon/lat)
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if name.to_ascii_uppercase().ends_with("CRS84") {
            return Some(Self::WGS84);
        }

        let code = name.rsplit(':').next()?.trim();
        let is_bare_number = !name.contains(':');
        let names_epsg = name.to_ascii_uppercase().contains("EPSG");

        if !is_bare_number && !names_epsg {
            return None;
        }

        code.parse::<u32>().ok().filter(|c| *c > 0).map(Self::from_epsg)
    }
}

impl Crs {
    /// Identifies the CRS described by an OGC or ESRI WKT string, as found
    /// in shapefile `.prj` sidecars.
    ///
    /// The root `AUTHORITY["EPSG", "..."]` wins when present. ESRI WKT
    /// carries no authorities, so the British National Grid, Web Mercator,
    /// WGS84 UTM zones and WGS84 itself are recognised by name.
    #[must_use]
    pub fn from_wkt(wkt: &str) -> Option<Self> {
        if let Some(code) = root_epsg_authority(wkt) {
            return Some(Self::from_epsg(code));
        }

        let name: String = wkt
            .chars()
            .filter(|c| !matches!(c, '_' | ' ' | '-' | '"'))
            .collect::<String>()
            .to_ascii_uppercase();
        let wgs84 = name.contains("WGS1984") || name.contains("WGS84");

        if name.starts_with("PROJCS") {
            if name.contains("BRITISHNATIONALGRID") {
                return Some(Self::from_epsg(EPSG_BRITISH_NATIONAL_GRID));
            }
            if name.contains("PSEUDOMERCATOR") || name.contains("WEBMERCATOR") {
                return Some(Self::from_epsg(EPSG_WEB_MERCATOR));
            }
            if wgs84 {
                return utm_zone(&name).map(|(zone, north)| {
                    let base = if north { 32_600 } else { 32_700 };
                    Self::from_epsg(base + zone)
                });
            }
            return None;
        }

        (name.starts_with("GEOGCS") && wgs84).then_some(Self::WGS84)
    }
}

/// The code of an EPSG authority that closes the root WKT node.
fn root_epsg_authority(wkt: &str) -> Option<u32> {
    let wkt = wkt.trim();
    let start = wkt.rfind("AUTHORITY[")? + "AUTHORITY[".len();
    let end = start + wkt[start..].find(']')?;
    if wkt[end + 1..].trim() != "]" {
        return None;
    }

    let mut parts = wkt[start..end].split(',').map(|p| p.trim().trim_matches('"'));
    let authority = parts.next()?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// `(zone, northern)` from a normalised `...UTMZONE30N...` name.
fn utm_zone(name: &str) -> Option<(u32, bool)> {
    let rest = &name[name.find("UTMZONE")? + "UTMZONE".len()..];
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let zone: u32 = rest[..digits].parse().ok().filter(|z| (1..=60).contains(z))?;
    match rest[digits..].chars().next()? {
        'N' => Some((zone, true)),
        'S' => Some((zone, false)),
        _ => None,
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Error returned when a CRS name cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCrsError {
    /// The name that failed to parse.
    pub name: String,
}

impl fmt::Display for InvalidCrsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized CRS name '{}'", self.name)
    }
}

impl std::error::Error for InvalidCrsError {}

impl FromStr for Crs {
    type Err = InvalidCrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidCrsError {
            name: s.to_string(),
        })
    }
}

impl TryFrom<String> for Crs {
    type Error = InvalidCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}
