//! The log-Jacobian `ln|I - rho W|` of the spatial-lag likelihood.

use crime_spatial_analytics_models::{JacobianMethod, LagOptions};
use crime_spatial_spatial::{SpatialWeights, WeightStyle};
use nalgebra::{DMatrix, DVector};
use nanorand::{Rng, WyRand};

use crate::linalg::dense_weights;

const POWER_ITERATIONS: usize = 1_000;
const POWER_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
enum Terms {
    /// Eigenvalues of `W` as `(re, im)` pairs.
    Eigen(Vec<(f64, f64)>),
    /// `tr(W^k)` for `k = 1..=order`.
    PowerSeries(Vec<f64>),
}

/// Precomputed log-Jacobian together with the admissible `rho` interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LogJacobian {
    terms: Terms,
    interval: (f64, f64),
}

impl LogJacobian {
    /// Builds the method selected in `options`.
    #[must_use]
    pub fn new(weights: &SpatialWeights, options: &LagOptions) -> Self {
        match options.method {
            JacobianMethod::Eigen => Self::eigen(weights),
            JacobianMethod::PowerSeries => Self::power_series(
                weights,
                options.power_series_order,
                options.trace_probes,
                options.seed,
            ),
        }
    }

    /// Exact log-Jacobian from the spectrum of `W`.
    ///
    /// Row-standardised weights on symmetric neighbour lists are similar
    /// to the symmetric `D^-1/2 C D^-1/2`, so a symmetric eigensolver
    /// suffices; anything else goes through the general (complex) one.
    /// The interval is `(1 / min re(lambda), 1 / max re(lambda))`.
    #[must_use]
    pub fn eigen(weights: &SpatialWeights) -> Self {
        let eigenvalues: Vec<(f64, f64)> = match symmetric_form(weights) {
            Some(symmetric) => symmetric
                .symmetric_eigenvalues()
                .iter()
                .map(|&re| (re, 0.0))
                .collect(),
            None => dense_weights(weights)
                .complex_eigenvalues()
                .iter()
                .map(|c| (c.re, c.im))
                .collect(),
        };

        let min = eigenvalues.iter().map(|e| e.0).fold(f64::INFINITY, f64::min);
        let max = eigenvalues.iter().map(|e| e.0).fold(f64::NEG_INFINITY, f64::max);
        let interval = (
            if min < 0.0 { 1.0 / min } else { -1.0 },
            if max > 0.0 { 1.0 / max } else { 1.0 },
        );

        log::debug!(
            "Eigen log-Jacobian: {} eigenvalues, rho in ({:.6}, {:.6})",
            eigenvalues.len(),
            interval.0,
            interval.1
        );

        Self {
            terms: Terms::Eigen(eigenvalues),
            interval,
        }
    }

    /// Truncated series `ln|I - rho W| = -sum_k rho^k tr(W^k) / k`.
    ///
    /// `tr(W)` and `tr(W^2)` are exact; higher traces are Hutchinson
    /// estimates `mean(u' W^k u)` over `probes` Rademacher vectors drawn
    /// from a generator seeded by `seed`. The interval is `(-1/r, 1/r)`
    /// with `r` the spectral radius from power iteration.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn power_series(weights: &SpatialWeights, order: usize, probes: usize, seed: u64) -> Self {
        let n = weights.n();
        let mut traces = Vec::with_capacity(order);
        if order >= 1 {
            traces.push(weights.trace());
        }
        if order >= 2 {
            traces.push(weights.trace_w2());
        }

        if order > 2 && probes > 0 {
            let mut sums = vec![0.0; order - 2];
            let mut rng = WyRand::new_seed(seed);

            for _ in 0..probes {
                let u: Vec<f64> = (0..n)
                    .map(|_| if rng.generate::<bool>() { 1.0 } else { -1.0 })
                    .collect();
                let mut power = weights.lag(&weights.lag(&u));
                for sum in &mut sums {
                    power = weights.lag(&power);
                    *sum += u.iter().zip(&power).map(|(a, b)| a * b).sum::<f64>();
                }
            }

            traces.extend(sums.into_iter().map(|s| s / probes as f64));
        }

        let radius = spectral_radius(weights);
        let interval = if radius > 0.0 {
            (-1.0 / radius, 1.0 / radius)
        } else {
            (-1.0, 1.0)
        };

        log::debug!(
            "Power-series log-Jacobian: order {order}, {probes} probes, spectral radius {radius:.6}"
        );

        Self {
            terms: Terms::PowerSeries(traces),
            interval,
        }
    }

    /// Admissible `(lower, upper)` bounds for `rho`.
    #[must_use]
    pub const fn interval(&self) -> (f64, f64) {
        self.interval
    }

    /// `ln|I - rho W|`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ln_det(&self, rho: f64) -> f64 {
        match &self.terms {
            Terms::Eigen(eigenvalues) => eigenvalues
                .iter()
                .map(|&(re, im)| rho.mul_add(-re, 1.0).hypot(rho * im).ln())
                .sum(),
            Terms::PowerSeries(traces) => {
                let mut power = 1.0;
                let mut sum = 0.0;
                for (k, trace) in traces.iter().enumerate() {
                    power *= rho;
                    sum -= power * trace / (k + 1) as f64;
                }
                sum
            }
        }
    }
}

/// The symmetric matrix similar to `W`, when one exists cheaply.
fn symmetric_form(weights: &SpatialWeights) -> Option<DMatrix<f64>> {
    if !weights.neighbours().is_symmetric() {
        return None;
    }

    match weights.style() {
        WeightStyle::B => Some(dense_weights(weights)),
        WeightStyle::W => {
            #[allow(clippy::cast_precision_loss)]
            let degrees: Vec<f64> = weights
                .neighbours()
                .iter()
                .map(|list| list.len() as f64)
                .collect();
            let n = weights.n();
            let mut symmetric = DMatrix::zeros(n, n);
            for (i, j, _) in weights.entries() {
                symmetric[(i, j)] = 1.0 / (degrees[i] * degrees[j]).sqrt();
            }
            Some(symmetric)
        }
    }
}

/// Perron root of the non-negative `W`, by power iteration on `W + I`
/// (which has a unique dominant eigenvalue even for bipartite graphs).
#[allow(clippy::cast_precision_loss)]
fn spectral_radius(weights: &SpatialWeights) -> f64 {
    let n = weights.n();
    if n == 0 {
        return 0.0;
    }

    let mut v = DVector::from_element(n, 1.0 / n as f64);
    let mut estimate = 0.0;
    for _ in 0..POWER_ITERATIONS {
        let next = DVector::from_vec(weights.lag(v.as_slice())) + &v;
        let ratio = next.sum() / v.sum() - 1.0;
        v = &next / next.sum();
        let settled = (ratio - estimate).abs() < POWER_TOLERANCE;
        estimate = ratio;
        if settled {
            break;
        }
    }
    estimate
}
