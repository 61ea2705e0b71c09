//! Transverse Mercator projection (Krüger series to fourth order in `n`).
//!
//! Serves UTM zones and the British National Grid. The conformal latitude
//! step is exact in both directions (Newton iteration on the inverse), so
//! the only truncation is in the `n^5` terms, well under a micrometre at
//! the scale of a national grid.

use crate::datum::Ellipsoid;

/// A Transverse Mercator projection on a given ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    /// Ellipsoid the projection is defined on.
    pub ellipsoid: Ellipsoid,
    /// Latitude of true origin, degrees.
    pub lat0: f64,
    /// Central meridian, degrees.
    pub lon0: f64,
    /// Scale factor on the central meridian.
    pub k0: f64,
    /// False easting, metres.
    pub false_easting: f64,
    /// False northing, metres.
    pub false_northing: f64,
}

impl TransverseMercator {
    /// Ordnance Survey National Grid (EPSG:27700) on Airy 1830.
    pub const BRITISH_NATIONAL_GRID: Self = Self {
        ellipsoid: Ellipsoid::AIRY_1830,
        lat0: 49.0,
        lon0: -2.0,
        k0: 0.999_601_271_7,
        false_easting: 400_000.0,
        false_northing: -100_000.0,
    };

    /// UTM zone `zone` (1-60) on WGS84.
    #[must_use]
    pub fn utm(zone: u32, north: bool) -> Self {
        Self {
            ellipsoid: Ellipsoid::WGS84,
            lat0: 0.0,
            lon0: f64::from(zone).mul_add(6.0, -183.0),
            k0: 0.9996,
            false_easting: 500_000.0,
            false_northing: if north { 0.0 } else { 10_000_000.0 },
        }
    }

    /// Projects geodetic degrees to `(easting, northing)` metres.
    #[must_use]
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let series = Series::new(self.ellipsoid);
        let (xi, eta) = series.xi_eta(lat_deg.to_radians(), (lon_deg - self.lon0).to_radians());
        let (xi0, _) = series.xi_eta(self.lat0.to_radians(), 0.0);

        let scale = self.k0 * series.big_a;
        (
            scale.mul_add(eta, self.false_easting),
            scale.mul_add(xi - xi0, self.false_northing),
        )
    }

    /// Inverse projection: `(easting, northing)` metres to geodetic degrees
    /// `(lon, lat)`.
    #[must_use]
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let series = Series::new(self.ellipsoid);
        let (xi0, _) = series.xi_eta(self.lat0.to_radians(), 0.0);

        let scale = self.k0 * series.big_a;
        let xi = (northing - self.false_northing) / scale + xi0;
        let eta = (easting - self.false_easting) / scale;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in series.beta.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let k = 2.0 * (j + 1) as f64;
            xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
        }

        let tau_p = xi_p.sin() / eta_p.sinh().hypot(xi_p.cos());
        let tau = tau_from_conformal(tau_p, self.ellipsoid.e());
        let lat = tau.atan();
        let lon = eta_p.sinh().atan2(xi_p.cos());

        (self.lon0 + lon.to_degrees(), lat.to_degrees())
    }
}

/// Ellipsoid-dependent Krüger coefficients.
struct Series {
    e: f64,
    big_a: f64,
    alpha: [f64; 4],
    beta: [f64; 4],
}

impl Series {
    fn new(ellipsoid: Ellipsoid) -> Self {
        let n = ellipsoid.n();
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;

        Self {
            e: ellipsoid.e(),
            big_a: ellipsoid.a / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0,
                61.0 * n3 / 240.0 - 103.0 * n4 / 140.0,
                49_561.0 * n4 / 161_280.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0,
                n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0,
                17.0 * n3 / 480.0 - 37.0 * n4 / 840.0,
                4397.0 * n4 / 161_280.0,
            ],
        }
    }

    /// Gauss-Krüger `(xi, eta)` for latitude and longitude offset from the
    /// central meridian, both in radians.
    fn xi_eta(&self, lat: f64, dlon: f64) -> (f64, f64) {
        let sin_lat = lat.sin();
        let t = (sin_lat.atanh() - self.e * (self.e * sin_lat).atanh()).sinh();

        let xi_p = t.atan2(dlon.cos());
        let eta_p = (dlon.sin() / t.hypot(1.0)).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, alpha) in self.alpha.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let k = 2.0 * (j + 1) as f64;
            xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        (xi, eta)
    }
}

/// Recovers `tan(lat)` from the tangent of the conformal latitude by
/// Newton iteration.
fn tau_from_conformal(tau_p: f64, e: f64) -> f64 {
    let e2 = e * e;
    let mut tau = tau_p;

    for _ in 0..10 {
        let sqrt1 = tau.hypot(1.0);
        let sigma = (e * (e * tau / sqrt1).atanh()).sinh();
        let tau_i = tau * sigma.hypot(1.0) - sigma * sqrt1;
        let dtau = (tau_p - tau_i) / tau_i.hypot(1.0) * (1.0 - e2).mul_add(tau * tau, 1.0)
            / ((1.0 - e2) * sqrt1);
        tau += dtau;
        if dtau.abs() < 1e-15 * tau.abs().max(1.0) {
            break;
        }
    }

    tau
}
