//! Reference ellipsoids and datum shifts.
//!
//! Datum changes go through earth-centred earth-fixed cartesian
//! coordinates and a 7-parameter Helmert transform. The only non-WGS84
//! datum that needs shifting is OSGB36 (British National Grid).

/// A reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in metres.
    pub a: f64,
    /// Flattening.
    pub f: f64,
}

impl Ellipsoid {
    /// WGS84.
    pub const WGS84: Self = Self {
        a: 6_378_137.0,
        f: 1.0 / 298.257_223_563,
    };

    /// Airy 1830, used by OSGB36.
    pub const AIRY_1830: Self = Self {
        a: 6_377_563.396,
        f: 1.0 / 299.324_964_6,
    };

    /// First eccentricity squared.
    #[must_use]
    pub fn e2(self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// First eccentricity.
    #[must_use]
    pub fn e(self) -> f64 {
        self.e2().sqrt()
    }

    /// Third flattening `n = f / (2 - f)`.
    #[must_use]
    pub fn n(self) -> f64 {
        self.f / (2.0 - self.f)
    }
}

/// Seven-parameter Helmert transform (position-vector convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Helmert {
    /// Translations in metres.
    pub t: [f64; 3],
    /// Scale change in parts per million.
    pub s_ppm: f64,
    /// Rotations in arc-seconds.
    pub r_arcsec: [f64; 3],
}

impl Helmert {
    /// OSGB36 -> WGS84, as published by Ordnance Survey.
    pub const OSGB36_TO_WGS84: Self = Self {
        t: [446.448, -125.157, 542.060],
        s_ppm: -20.4894,
        r_arcsec: [0.1502, 0.2470, 0.8421],
    };

    /// The reverse transform. Exact to first order in the (tiny)
    /// rotation and scale parameters.
    #[must_use]
    pub fn inverse(self) -> Self {
        Self {
            t: [-self.t[0], -self.t[1], -self.t[2]],
            s_ppm: -self.s_ppm,
            r_arcsec: [-self.r_arcsec[0], -self.r_arcsec[1], -self.r_arcsec[2]],
        }
    }

    /// Applies the transform to an ECEF coordinate.
    #[must_use]
    pub fn apply(self, [x, y, z]: [f64; 3]) -> [f64; 3] {
        let s = 1.0 + self.s_ppm * 1e-6;
        let to_rad = |arcsec: f64| (arcsec / 3600.0).to_radians();
        let (rx, ry, rz) = (
            to_rad(self.r_arcsec[0]),
            to_rad(self.r_arcsec[1]),
            to_rad(self.r_arcsec[2]),
        );

        [
            self.t[0] + s * x - rz * y + ry * z,
            self.t[1] + rz * x + s * y - rx * z,
            self.t[2] - ry * x + rx * y + s * z,
        ]
    }
}

/// Geodetic `(lat, lon, h)` (radians, radians, metres) to ECEF.
#[must_use]
pub fn geodetic_to_ecef(ellipsoid: Ellipsoid, lat: f64, lon: f64, h: f64) -> [f64; 3] {
    let e2 = ellipsoid.e2();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let nu = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();

    [
        (nu + h) * cos_lat * lon.cos(),
        (nu + h) * cos_lat * lon.sin(),
        (nu * (1.0 - e2) + h) * sin_lat,
    ]
}

/// ECEF to geodetic `(lat, lon, h)`, iterating on latitude until it
/// settles below a micro-arcsecond.
#[must_use]
pub fn ecef_to_geodetic(ellipsoid: Ellipsoid, [x, y, z]: [f64; 3]) -> (f64, f64, f64) {
    let e2 = ellipsoid.e2();
    let p = x.hypot(y);
    let lon = y.atan2(x);

    let mut lat = z.atan2(p * (1.0 - e2));
    let mut nu = ellipsoid.a;
    for _ in 0..20 {
        let sin_lat = lat.sin();
        nu = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let next = (z + e2 * nu * sin_lat).atan2(p);
        let settled = (next - lat).abs() < 1e-14;
        lat = next;
        if settled {
            break;
        }
    }

    let h = p / lat.cos() - nu;
    (lat, lon, h)
}

/// Moves a geodetic position from one datum to another.
#[must_use]
pub fn shift_datum(
    from: Ellipsoid,
    to: Ellipsoid,
    helmert: Helmert,
    lat: f64,
    lon: f64,
) -> (f64, f64) {
    let ecef = geodetic_to_ecef(from, lat, lon, 0.0);
    let shifted = helmert.apply(ecef);
    let (lat, lon, _) = ecef_to_geodetic(to, shifted);
    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecef_roundtrip() {
        let lat = 51.5_f64.to_radians();
        let lon = (-0.12_f64).to_radians();
        let ecef = geodetic_to_ecef(Ellipsoid::WGS84, lat, lon, 25.0);
        let (lat2, lon2, h2) = ecef_to_geodetic(Ellipsoid::WGS84, ecef);
        assert!((lat - lat2).abs() < 1e-12);
        assert!((lon - lon2).abs() < 1e-12);
        assert!((h2 - 25.0).abs() < 1e-6);
    }

    #[test]
    fn helmert_inverse_undoes_shift() {
        let point = geodetic_to_ecef(
            Ellipsoid::AIRY_1830,
            52.0_f64.to_radians(),
            (-1.0_f64).to_radians(),
            0.0,
        );
        let there = Helmert::OSGB36_TO_WGS84.apply(point);
        let back = Helmert::OSGB36_TO_WGS84.inverse().apply(there);
        for i in 0..3 {
            assert!((point[i] - back[i]).abs() < 0.01, "axis {i}");
        }
    }

    #[test]
    fn osgb36_shift_is_about_a_hundred_metres() {
        let lat = 51.5_f64.to_radians();
        let lon = (-0.12_f64).to_radians();
        let (lat2, lon2) = shift_datum(
            Ellipsoid::AIRY_1830,
            Ellipsoid::WGS84,
            Helmert::OSGB36_TO_WGS84,
            lat,
            lon,
        );
        let dlat_m = (lat2 - lat) * 6_371_000.0;
        let dlon_m = (lon2 - lon) * 6_371_000.0 * lat.cos();
        let shift = dlat_m.hypot(dlon_m);
        assert!(shift > 50.0 && shift < 200.0, "shift was {shift} m");
    }
}
