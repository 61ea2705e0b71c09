#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure-Rust coordinate reprojection between WGS84 and the projected
//! systems the input layers arrive in.
//!
//! Supported: WGS84 / CRS84 (4326), Web Mercator (3857), UTM north and
//! south (326xx / 327xx) and the British National Grid (27700, with the
//! OSGB36 datum shift). Everything goes through WGS84 longitude/latitude,
//! so any supported pair can be converted.

pub mod datum;
pub mod transverse_mercator;

use crime_spatial_geography_models::Crs;
use crime_spatial_geography_models::crs::{
    EPSG_BRITISH_NATIONAL_GRID, EPSG_WEB_MERCATOR, EPSG_WGS84,
};
use geo::{Coord, MapCoords};
use thiserror::Error;

use crate::datum::{Ellipsoid, Helmert, shift_datum};
use crate::transverse_mercator::TransverseMercator;

/// Spherical radius used by Web Mercator.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Errors that can occur during reprojection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReprojectError {
    /// No transform is implemented for this CRS.
    #[error("Unsupported CRS {crs}: expected EPSG:4326, 3857, 27700, 326xx or 327xx")]
    UnsupportedCrs {
        /// The CRS that was requested.
        crs: Crs,
    },

    /// The transform produced a NaN or infinite coordinate.
    #[error("Reprojecting ({x}, {y}) from {from} to {to} produced a non-finite coordinate")]
    NonFinite {
        /// Source x.
        x: f64,
        /// Source y.
        y: f64,
        /// Source CRS.
        from: Crs,
        /// Target CRS.
        to: Crs,
    },
}

/// How a CRS relates to WGS84 longitude/latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Projection {
    Geographic,
    WebMercator,
    TransverseMercator {
        tm: TransverseMercator,
        /// Helmert transform from the projection's datum to WGS84, if
        /// the datum is not WGS84 itself.
        to_wgs84: Option<Helmert>,
    },
}

impl Projection {
    fn for_crs(crs: Crs) -> Result<Self, ReprojectError> {
        let epsg = crs.epsg();

        if epsg == EPSG_WGS84 {
            return Ok(Self::Geographic);
        }
        if epsg == EPSG_WEB_MERCATOR {
            return Ok(Self::WebMercator);
        }
        if epsg == EPSG_BRITISH_NATIONAL_GRID {
            return Ok(Self::TransverseMercator {
                tm: TransverseMercator::BRITISH_NATIONAL_GRID,
                to_wgs84: Some(Helmert::OSGB36_TO_WGS84),
            });
        }
        if let Some((zone, north)) = parse_utm_epsg(epsg) {
            return Ok(Self::TransverseMercator {
                tm: TransverseMercator::utm(zone, north),
                to_wgs84: None,
            });
        }

        Err(ReprojectError::UnsupportedCrs { crs })
    }

    fn to_wgs84(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Geographic => (x, y),
            Self::WebMercator => (
                (x / WEB_MERCATOR_RADIUS).to_degrees(),
                (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees(),
            ),
            Self::TransverseMercator { tm, to_wgs84 } => {
                let (lon, lat) = tm.inverse(x, y);
                match to_wgs84 {
                    None => (lon, lat),
                    Some(helmert) => {
                        let (lat, lon) = shift_datum(
                            tm.ellipsoid,
                            Ellipsoid::WGS84,
                            helmert,
                            lat.to_radians(),
                            lon.to_radians(),
                        );
                        (lon.to_degrees(), lat.to_degrees())
                    }
                }
            }
        }
    }

    fn from_wgs84(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Geographic => (lon, lat),
            Self::WebMercator => (
                WEB_MERCATOR_RADIUS * lon.to_radians(),
                WEB_MERCATOR_RADIUS
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                        .tan()
                        .ln(),
            ),
            Self::TransverseMercator { tm, to_wgs84 } => {
                let (lon, lat) = match to_wgs84 {
                    None => (lon, lat),
                    Some(helmert) => {
                        let (lat, lon) = shift_datum(
                            Ellipsoid::WGS84,
                            tm.ellipsoid,
                            helmert.inverse(),
                            lat.to_radians(),
                            lon.to_radians(),
                        );
                        (lon.to_degrees(), lat.to_degrees())
                    }
                };
                tm.forward(lon, lat)
            }
        }
    }
}

/// Parses an EPSG code into UTM zone info: `Some((zone, is_north))`.
///
/// - EPSG 326xx -> zone xx, northern hemisphere
/// - EPSG 327xx -> zone xx, southern hemisphere
#[must_use]
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32_601..=32_660).contains(&epsg) {
        Some((epsg - 32_600, true))
    } else if (32_701..=32_760).contains(&epsg) {
        Some((epsg - 32_700, false))
    } else {
        None
    }
}

/// Whether coordinates in `crs` can be converted.
#[must_use]
pub fn is_supported(crs: Crs) -> bool {
    Projection::for_crs(crs).is_ok()
}

/// A prepared transform between two coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reprojector {
    from: Crs,
    to: Crs,
    source: Projection,
    target: Projection,
}

impl Reprojector {
    /// Prepares a transform from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError::UnsupportedCrs`] if either side has no
    /// implemented projection.
    pub fn new(from: Crs, to: Crs) -> Result<Self, ReprojectError> {
        Ok(Self {
            from,
            to,
            source: Projection::for_crs(from)?,
            target: Projection::for_crs(to)?,
        })
    }

    /// Transform into WGS84 longitude/latitude.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError::UnsupportedCrs`] for unsupported CRSs.
    pub fn to_wgs84(from: Crs) -> Result<Self, ReprojectError> {
        Self::new(from, Crs::WGS84)
    }

    /// Whether this transform leaves coordinates untouched.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Source CRS.
    #[must_use]
    pub const fn from(&self) -> Crs {
        self.from
    }

    /// Target CRS.
    #[must_use]
    pub const fn to(&self) -> Crs {
        self.to
    }

    /// Transforms a single coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError::NonFinite`] if the result is NaN or
    /// infinite (e.g. a pole in Web Mercator).
    pub fn point(&self, x: f64, y: f64) -> Result<(f64, f64), ReprojectError> {
        if self.is_identity() {
            return Ok((x, y));
        }

        let (lon, lat) = self.source.to_wgs84(x, y);
        let (tx, ty) = self.target.from_wgs84(lon, lat);

        if tx.is_finite() && ty.is_finite() {
            Ok((tx, ty))
        } else {
            Err(ReprojectError::NonFinite {
                x,
                y,
                from: self.from,
                to: self.to,
            })
        }
    }

    /// Transforms every coordinate of a `geo` geometry.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReprojectError`] hit by any coordinate.
    pub fn geometry<G>(&self, geometry: &G) -> Result<G::Output, ReprojectError>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|coord| {
            let (x, y) = self.point(coord.x, coord.y)?;
            Ok(Coord { x, y })
        })
    }
}
