//! Maximum-likelihood spatial-lag model `y = rho W y + X beta + e`.
//!
//! `beta` and `sigma^2` are concentrated out, leaving a one-dimensional
//! likelihood in `rho`:
//!
//! ```text
//! l(rho) = ln|I - rho W| - n/2 ln(2 pi) - n/2 ln(SSE(rho) / n) - n/2
//! SSE(rho) = |e0 - rho eL|^2
//! ```
//!
//! where `e0` and `eL` are the OLS residuals of `y` and `W y` on `X`.
//! Standard errors come from the analytical information matrix, which
//! needs a dense `(I - rho W)^-1`.

use std::f64::consts::PI;

use crime_spatial_analytics_models::{
    Alternative, Coefficient, Impact, JacobianMethod, LagOptions, LagSummary, TestStatistic,
};
use crime_spatial_spatial::SpatialWeights;
use nalgebra::{DMatrix, DVector};

use crate::design::Design;
use crate::distributions::{chi_squared_sf, normal_p_value};
use crate::jacobian::LogJacobian;
use crate::linalg::{annihilate, dense_weights, lag, trace_of_product, weights_times};
use crate::ols::fit_ols;
use crate::optimize::maximize;
use crate::{AnalyticsError, check_islands, check_len};

/// A fitted spatial-lag model.
#[derive(Debug, Clone)]
pub struct LagFit {
    design: Design,
    method: JacobianMethod,
    rho: f64,
    rho_fixed: bool,
    interval: (f64, f64),
    iterations: usize,
    beta: DVector<f64>,
    sigma2: f64,
    log_likelihood: f64,
    ols_log_likelihood: f64,
    ols_aic: f64,
    null_log_likelihood: f64,
    covariance: DMatrix<f64>,
    residuals: DVector<f64>,
    residual_lm: TestStatistic,
    impacts: Vec<Impact>,
}

/// Gaussian log-likelihood at the ML variance for a residual sum of
/// squares, without the Jacobian term.
#[allow(clippy::cast_precision_loss)]
fn gaussian_log_likelihood(sse: f64, n: usize) -> f64 {
    let n = n as f64;
    -0.5 * n * ((2.0 * PI).ln() + (sse / n).ln() + 1.0)
}

/// Fits the lag model on `design` with weights `weights`.
///
/// # Errors
///
/// * [`AnalyticsError::DimensionMismatch`] if the design and `weights`
///   disagree on the number of cells.
/// * [`AnalyticsError::EmptyNeighbourSets`] if there are islands and the
///   zero policy is off.
/// * Any error from [`fit_ols`] on the same design.
/// * [`AnalyticsError::RhoOutOfBounds`] if `fixed_rho` lies outside the
///   admissible interval.
/// * [`AnalyticsError::NonConvergence`] if the optimiser hits its
///   iteration cap.
/// * [`AnalyticsError::SingularSpatialFilter`] if `I - rho W` cannot be
///   inverted at the estimate.
#[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
pub fn fit_lag(
    design: &Design,
    weights: &SpatialWeights,
    options: &LagOptions,
) -> Result<LagFit, AnalyticsError> {
    let n = design.n();
    check_len("weights", n, weights.n())?;
    check_islands(weights, options.zero_policy)?;

    let ols = fit_ols(design)?;
    let x = design.x();
    let xtx_inv = ols.xtx_inv();

    let wy = lag(weights, design.y());
    let beta_lag = xtx_inv * (x.transpose() * &wy);
    let e0 = ols.residuals().clone();
    let e_lag = annihilate(x, xtx_inv, &wy);

    let e0e0 = e0.norm_squared();
    let e0el = e0.dot(&e_lag);
    let elel = e_lag.norm_squared();
    let sse = |rho: f64| rho.mul_add(rho * elel, 2.0f64.mul_add(-rho * e0el, e0e0));

    let jacobian = LogJacobian::new(weights, options);
    let interval = jacobian.interval();
    let concentrated = |rho: f64| jacobian.ln_det(rho) + gaussian_log_likelihood(sse(rho), n);

    let (rho, iterations, rho_fixed) = match options.fixed_rho {
        Some(rho) => {
            if rho <= interval.0 || rho >= interval.1 {
                return Err(AnalyticsError::RhoOutOfBounds {
                    rho,
                    lower: interval.0,
                    upper: interval.1,
                });
            }
            (rho, 0, true)
        }
        None => {
            let optimum = maximize(
                concentrated,
                interval.0,
                interval.1,
                options.tolerance,
                options.max_iterations,
            )?;
            (optimum.x, optimum.iterations, false)
        }
    };

    let beta = ols.coefficients() - &beta_lag * rho;
    let residuals = &e0 - &e_lag * rho;
    let sigma2 = residuals.norm_squared() / n as f64;
    let log_likelihood = concentrated(rho);

    let y = design.y();
    let mean = y.mean();
    let null_log_likelihood = gaussian_log_likelihood(y.map(|v| v - mean).norm_squared(), n);

    let a_inv = spatial_filter_inverse(weights, rho)?;
    let covariance = information_matrix(x, weights, &a_inv, &beta, sigma2)
        .try_inverse()
        .unwrap_or_else(|| {
            log::warn!("Lag model information matrix is singular; standard errors are undefined");
            DMatrix::from_element(design.k() + 2, design.k() + 2, f64::NAN)
        });

    let residual_lm = {
        let t = weights.trace_wtw() + weights.trace_w2();
        let d = residuals.dot(&lag(weights, &residuals)) / sigma2;
        let statistic = d * d / t;
        TestStatistic {
            statistic,
            df: 1.0,
            p_value: chi_squared_sf(statistic, 1.0),
        }
    };

    let impacts = impacts(design, &beta, &a_inv);

    log::info!(
        "Spatial lag {}: rho = {rho:.6} in ({:.4}, {:.4}), logLik = {log_likelihood:.4} after {iterations} iterations",
        design.response(),
        interval.0,
        interval.1
    );

    Ok(LagFit {
        design: design.clone(),
        method: options.method,
        rho,
        rho_fixed,
        interval,
        iterations,
        beta,
        sigma2,
        log_likelihood,
        ols_log_likelihood: ols.log_likelihood(),
        ols_aic: ols.aic(),
        null_log_likelihood,
        covariance,
        residuals,
        residual_lm,
        impacts,
    })
}

/// Asymptotic information matrix for `(beta, rho, sigma^2)`.
fn information_matrix(
    x: &DMatrix<f64>,
    weights: &SpatialWeights,
    a_inv: &DMatrix<f64>,
    beta: &DVector<f64>,
    sigma2: f64,
) -> DMatrix<f64> {
    let k = x.ncols();
    #[allow(clippy::cast_precision_loss)]
    let n = x.nrows() as f64;

    let wa = weights_times(weights, a_inv);
    let wa_xb = &wa * (x * beta);

    let mut info = DMatrix::zeros(k + 2, k + 2);
    info.view_mut((0, 0), (k, k))
        .copy_from(&(x.transpose() * x / sigma2));

    let beta_rho = x.transpose() * &wa_xb / sigma2;
    for j in 0..k {
        info[(j, k)] = beta_rho[j];
        info[(k, j)] = beta_rho[j];
    }

    info[(k, k)] = trace_of_product(&wa, &wa) + wa.norm_squared() + wa_xb.norm_squared() / sigma2;
    info[(k, k + 1)] = wa.trace() / sigma2;
    info[(k + 1, k)] = info[(k, k + 1)];
    info[(k + 1, k + 1)] = n / (2.0 * sigma2 * sigma2);

    info
}

/// Average direct, indirect and total effects from `S_r = (I - rho W)^-1 beta_r`.
#[allow(clippy::cast_precision_loss)]
fn impacts(design: &Design, beta: &DVector<f64>, a_inv: &DMatrix<f64>) -> Vec<Impact> {
    let n = design.n() as f64;
    let direct_scale = a_inv.trace() / n;
    let total_scale = a_inv.sum() / n;

    design
        .names()
        .iter()
        .enumerate()
        .skip(1)
        .map(|(j, name)| {
            let direct = beta[j] * direct_scale;
            let total = beta[j] * total_scale;
            Impact {
                name: name.clone(),
                direct,
                indirect: total - direct,
                total,
            }
        })
        .collect()
}

impl LagFit {
    /// Estimated (or fixed) `rho`.
    #[must_use]
    pub const fn rho(&self) -> f64 {
        self.rho
    }

    /// Regression coefficients, intercept first.
    #[must_use]
    pub const fn beta(&self) -> &DVector<f64> {
        &self.beta
    }

    /// ML error variance.
    #[must_use]
    pub const fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Maximised log-likelihood.
    #[must_use]
    pub const fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Admissible interval `rho` was searched within.
    #[must_use]
    pub const fn interval(&self) -> (f64, f64) {
        self.interval
    }

    /// Residuals `y - rho W y - X beta`.
    #[must_use]
    pub const fn residuals(&self) -> &DVector<f64> {
        &self.residuals
    }

    /// Asymptotic covariance of `(beta, rho, sigma^2)`.
    #[must_use]
    pub const fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// AIC with `k + 2` parameters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aic(&self) -> f64 {
        2.0f64.mul_add((self.design.k() + 2) as f64, -2.0 * self.log_likelihood)
    }

    /// Coefficient tables, tests and impacts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> LagSummary {
        let k = self.design.k();
        let z_row = |name: &str, estimate: f64, variance: f64| {
            let std_error = variance.sqrt();
            let statistic = estimate / std_error;
            Coefficient {
                name: name.to_string(),
                estimate,
                std_error,
                statistic,
                p_value: normal_p_value(statistic, Alternative::TwoSided),
            }
        };

        let coefficients = self
            .design
            .names()
            .iter()
            .enumerate()
            .map(|(j, name)| z_row(name, self.beta[j], self.covariance[(j, j)]))
            .collect();
        let rho = z_row("rho", self.rho, self.covariance[(k, k)]);

        let wald_statistic = rho.statistic * rho.statistic;
        let lr_statistic = 2.0 * (self.log_likelihood - self.ols_log_likelihood);
        let n = self.design.n() as f64;

        LagSummary {
            response: self.design.response().to_string(),
            coefficients,
            rho,
            rho_fixed: self.rho_fixed,
            rho_interval: self.interval,
            wald: TestStatistic {
                statistic: wald_statistic,
                df: 1.0,
                p_value: chi_squared_sf(wald_statistic, 1.0),
            },
            likelihood_ratio: TestStatistic {
                statistic: lr_statistic,
                df: 1.0,
                p_value: chi_squared_sf(lr_statistic, 1.0),
            },
            residual_autocorrelation: self.residual_lm,
            log_likelihood: self.log_likelihood,
            aic: self.aic(),
            ols_aic: self.ols_aic,
            sigma2: self.sigma2,
            pseudo_r_squared: 1.0
                - (-2.0 / n * (self.log_likelihood - self.null_log_likelihood)).exp(),
            method: self.method,
            iterations: self.iterations,
            impacts: self.impacts.clone(),
            residuals: self.residuals.iter().copied().collect(),
        }
    }
}

/// `(I - rho W)^-1`, dense.
fn spatial_filter_inverse(
    weights: &SpatialWeights,
    rho: f64,
) -> Result<DMatrix<f64>, AnalyticsError> {
    let n = weights.n();
    (DMatrix::identity(n, n) - dense_weights(weights) * rho)
        .try_inverse()
        .ok_or(AnalyticsError::SingularSpatialFilter { rho })
}

#[cfg(test)]
mod tests {
    use crime_spatial_spatial::{Neighbours, WeightStyle};

    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(
            diff < tol,
            "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}"
        );
    }

    fn queen(cols: usize, rows: usize) -> SpatialWeights {
        let lists = (0..rows * cols)
            .map(|i| {
                let (r, c) = (i / cols, i % cols);
                (0..rows * cols)
                    .filter(|&j| {
                        let (rr, cc) = (j / cols, j % cols);
                        j != i && r.abs_diff(rr) <= 1 && c.abs_diff(cc) <= 1
                    })
                    .collect()
            })
            .collect();
        SpatialWeights::new(Neighbours::from_lists(lists).unwrap(), WeightStyle::W)
    }

    fn design() -> Design {
        Design::new(
            "y",
            vec![3.0, 5.0, 4.0, 8.0, 9.0, 7.0, 12.0, 11.0, 10.0],
            vec![(
                "x".to_string(),
                vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0, 8.0, 7.0, 9.0],
            )],
        )
        .unwrap()
    }

    // Reference values from a direct maximisation of the full likelihood
    // with dense determinants.
    #[test]
    fn matches_reference_fit() {
        let fit = fit_lag(&design(), &queen(3, 3), &LagOptions::default()).unwrap();
        let summary = fit.summary();

        assert_close(fit.rho(), 0.432_445_081_548_630_7, 1e-6, "rho");
        assert_close(fit.beta()[0], 0.128_549_513_091_666_07, 1e-5, "intercept");
        assert_close(fit.beta()[1], 0.821_797_564_347_875_1, 1e-6, "x");
        assert_close(fit.sigma2(), 2.351_400_551_072_108_8, 1e-6, "sigma2");
        assert_close(fit.log_likelihood(), -16.834_831_252_109_858, 1e-9, "logLik");

        assert_close(summary.coefficients[0].std_error, 2.248_150_887_749_823_7, 1e-5, "se intercept");
        assert_close(summary.coefficients[1].std_error, 0.220_805_969_242_989_2, 1e-5, "se x");
        assert_close(summary.rho.std_error, 0.333_171_451_021_306_7, 1e-5, "se rho");

        assert_close(summary.likelihood_ratio.statistic, 0.673_659_583_913_035_9, 1e-8, "LR");
        assert_close(summary.aic, 41.669_662_504_219_716, 1e-8, "AIC");
        assert_close(summary.pseudo_r_squared, 0.722_408_733_663_163_2, 1e-8, "pseudo R2");

        let impact = &summary.impacts[0];
        assert_eq!(impact.name, "x");
        assert_close(impact.direct, 0.866_828_943_842_752, 1e-5, "direct");
        assert_close(impact.total, 1.447_961_311_991_150_7, 1e-5, "total");
        assert_close(impact.indirect, impact.total - impact.direct, 1e-12, "indirect");
        assert!(!summary.rho_fixed);
        assert!(summary.iterations > 0);
    }

    #[test]
    fn maximum_beats_its_neighbourhood() {
        let weights = queen(3, 3);
        let fit = fit_lag(&design(), &weights, &LagOptions::default()).unwrap();

        for offset in [-0.01, 0.01] {
            let nearby = fit_lag(
                &design(),
                &weights,
                &LagOptions {
                    fixed_rho: Some(fit.rho() + offset),
                    ..LagOptions::default()
                },
            )
            .unwrap();
            assert!(nearby.log_likelihood() < fit.log_likelihood());
        }
    }

    #[test]
    fn zero_rho_reproduces_ols() {
        let design = design();
        let ols = fit_ols(&design).unwrap();
        let fit = fit_lag(
            &design,
            &queen(3, 3),
            &LagOptions {
                fixed_rho: Some(0.0),
                ..LagOptions::default()
            },
        )
        .unwrap();

        for j in 0..design.k() {
            assert_close(fit.beta()[j], ols.coefficients()[j], 1e-12, "beta");
        }
        assert_close(fit.log_likelihood(), ols.log_likelihood(), 1e-10, "logLik");

        let summary = fit.summary();
        assert!(summary.rho_fixed);
        assert_eq!(summary.iterations, 0);
        assert_close(summary.likelihood_ratio.statistic, 0.0, 1e-9, "LR");
        assert_close(summary.impacts[0].indirect, 0.0, 1e-12, "indirect");
    }

    #[test]
    fn fixed_rho_outside_interval_is_rejected() {
        let err = fit_lag(
            &design(),
            &queen(3, 3),
            &LagOptions {
                fixed_rho: Some(1.5),
                ..LagOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::RhoOutOfBounds { .. }));
    }

    #[test]
    fn power_series_agrees_with_eigen() {
        let weights = queen(3, 3);
        let eigen = fit_lag(&design(), &weights, &LagOptions::default()).unwrap();
        let series = fit_lag(
            &design(),
            &weights,
            &LagOptions {
                method: JacobianMethod::PowerSeries,
                trace_probes: 200,
                ..LagOptions::default()
            },
        )
        .unwrap();
        assert_close(series.rho(), eigen.rho(), 0.05, "rho");
    }

    #[test]
    fn iteration_cap_is_an_error() {
        let err = fit_lag(
            &design(),
            &queen(3, 3),
            &LagOptions {
                max_iterations: 1,
                ..LagOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::NonConvergence { iterations: 1, .. }));
    }

    #[test]
    fn islands_need_zero_policy() {
        let neighbours = Neighbours::from_lists(vec![
            vec![1],
            vec![0, 2],
            vec![1, 3],
            vec![2, 4],
            vec![3],
            vec![],
        ])
        .unwrap();
        let weights = SpatialWeights::new(neighbours, WeightStyle::W);
        let design = Design::new(
            "y",
            vec![1.0, 3.0, 2.0, 5.0, 4.0, 9.0],
            vec![("x".to_string(), vec![1.0, 2.0, 2.0, 4.0, 5.0, 7.0])],
        )
        .unwrap();

        assert!(fit_lag(&design, &weights, &LagOptions::default()).is_ok());
        assert_eq!(
            fit_lag(
                &design,
                &weights,
                &LagOptions {
                    zero_policy: false,
                    ..LagOptions::default()
                },
            )
            .unwrap_err(),
            AnalyticsError::EmptyNeighbourSets { count: 1 }
        );
    }

    #[test]
    fn weights_must_match_the_design() {
        let err = fit_lag(&design(), &queen(2, 2), &LagOptions::default()).unwrap_err();
        assert!(
            matches!(
                err,
                AnalyticsError::DimensionMismatch {
                    expected: 9,
                    actual: 4,
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn singular_filter_is_reported() {
        let pair = SpatialWeights::new(
            Neighbours::from_lists(vec![vec![1], vec![0]]).unwrap(),
            WeightStyle::W,
        );
        assert_eq!(
            spatial_filter_inverse(&pair, 1.0).unwrap_err(),
            AnalyticsError::SingularSpatialFilter { rho: 1.0 }
        );

        let inverse = spatial_filter_inverse(&pair, 0.5).unwrap();
        assert_close(inverse[(0, 0)], 4.0 / 3.0, 1e-12, "a_inv[0][0]");
        assert_close(inverse[(0, 1)], 2.0 / 3.0, 1e-12, "a_inv[0][1]");
    }
}
