//! Global Moran's I.
//!
//! [`moran_test`] follows the classical moments under normality or
//! randomisation. With the zero policy on, cells without neighbours get
//! a zero lag and are dropped from the effective `n` used in the moments,
//! while the mean and kurtosis still use every cell.

use crime_spatial_analytics_models::{
    Alternative, MoranOptions, MoranResult, NullAssumption, PermutationResult,
    ResidualMoranResult,
};
use crime_spatial_spatial::SpatialWeights;
use nalgebra::DVector;
use nanorand::{Rng, WyRand};

use crate::distributions::normal_p_value;
use crate::linalg::{dense_weights, lag, times_weights, trace_of_product};
use crate::ols::OlsFit;
use crate::{AnalyticsError, check_islands, check_len};

/// Checks the variable length and the island policy, returning the
/// number of islands.
fn check_inputs(
    x_len: usize,
    weights: &SpatialWeights,
    zero_policy: bool,
) -> Result<usize, AnalyticsError> {
    check_len("variable", weights.n(), x_len)?;
    check_islands(weights, zero_policy)
}

/// Deviations from the mean.
#[allow(clippy::cast_precision_loss)]
fn centre(x: &[f64]) -> Vec<f64> {
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    x.iter().map(|v| v - mean).collect()
}

/// `(n / S0) * z'Wz / z'z` for centred `z`.
#[allow(clippy::cast_precision_loss)]
fn statistic(z: &[f64], weights: &SpatialWeights, n: usize, s0: f64) -> f64 {
    let lz = weights.lag(z);
    let cross: f64 = z.iter().zip(&lz).map(|(a, b)| a * b).sum();
    let zz: f64 = z.iter().map(|v| v * v).sum();
    (n as f64 / s0) * cross / zz
}

/// Global Moran's I of `x` with its analytical moments and a normal
/// approximation p-value.
///
/// # Errors
///
/// * [`AnalyticsError::DimensionMismatch`] if `x` and `weights` disagree
///   on the number of cells.
/// * [`AnalyticsError::EmptyNeighbourSets`] if there are islands and the
///   zero policy is off.
/// * [`AnalyticsError::TooFewObservations`] if the effective `n` is too
///   small for the requested variance.
#[allow(clippy::cast_precision_loss, clippy::similar_names)]
pub fn moran_test(
    x: &[f64],
    weights: &SpatialWeights,
    options: &MoranOptions,
) -> Result<MoranResult, AnalyticsError> {
    let islands = check_inputs(x.len(), weights, options.zero_policy)?;
    let n = x.len() - islands;

    let required = match options.assumption {
        NullAssumption::Randomisation => 4,
        NullAssumption::Normality => 2,
    };
    if n < required {
        return Err(AnalyticsError::TooFewObservations { n, required });
    }

    let z = centre(x);
    let s0 = weights.s0();
    let s1 = weights.s1();
    let s2 = weights.s2();
    let i = statistic(&z, weights, n, s0);

    let nf = n as f64;
    let s02 = s0 * s0;
    let nn = nf * nf;
    let expectation = -1.0 / (nf - 1.0);

    let variance = match options.assumption {
        NullAssumption::Normality => {
            (nn * s1 - nf * s2 + 3.0 * s02) / (s02 * (nn - 1.0)) - expectation * expectation
        }
        NullAssumption::Randomisation => {
            let zz: f64 = z.iter().map(|v| v * v).sum();
            let z4: f64 = z.iter().map(|v| v.powi(4)).sum();
            let kurtosis = x.len() as f64 * z4 / (zz * zz);

            let a = nf * (s1 * (3.0f64.mul_add(-nf, nn) + 3.0) - nf * s2 + 3.0 * s02);
            let b = kurtosis * (s1 * (nn - nf) - 2.0 * nf * s2 + 6.0 * s02);
            (a - b) / ((nf - 1.0) * (nf - 2.0) * (nf - 3.0) * s02) - expectation * expectation
        }
    };

    let z_score = (i - expectation) / variance.sqrt();
    if !z_score.is_finite() {
        log::warn!("Moran's I is undefined (constant variable or degenerate weights)");
    }

    Ok(MoranResult {
        statistic: i,
        expectation,
        variance,
        z_score,
        p_value: normal_p_value(z_score, options.alternative),
        assumption: options.assumption,
        alternative: options.alternative,
        n,
        islands,
    })
}

/// Moran's I against its permutation distribution.
///
/// Draws `simulations` random relabellings of `x` over the cells with a
/// generator seeded by `seed`, so results are reproducible. The pseudo
/// p-value is `(extreme + 1) / (simulations + 1)`; for the two-sided
/// alternative it is twice the smaller one-sided value, capped at 1.
///
/// # Errors
///
/// As [`moran_test`], plus [`AnalyticsError::TooFewObservations`] when
/// `simulations` is zero.
pub fn moran_permutation_test(
    x: &[f64],
    weights: &SpatialWeights,
    options: &MoranOptions,
    simulations: usize,
    seed: u64,
) -> Result<PermutationResult, AnalyticsError> {
    let islands = check_inputs(x.len(), weights, options.zero_policy)?;
    if simulations == 0 {
        return Err(AnalyticsError::TooFewObservations {
            n: 0,
            required: 1,
        });
    }

    let n = x.len() - islands;
    let s0 = weights.s0();
    let z = centre(x);
    let observed = statistic(&z, weights, n, s0);

    let mut rng = WyRand::new_seed(seed);
    let mut permuted = z;
    let draws: Vec<f64> = (0..simulations)
        .map(|_| {
            rng.shuffle(&mut permuted);
            statistic(&permuted, weights, n, s0)
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let sims = simulations as f64;
    #[allow(clippy::cast_precision_loss)]
    let tail = |count: usize| (count as f64 + 1.0) / (sims + 1.0);
    let greater = tail(draws.iter().filter(|&&d| d >= observed).count());
    let less = tail(draws.iter().filter(|&&d| d <= observed).count());
    let p_value = match options.alternative {
        Alternative::Greater => greater,
        Alternative::Less => less,
        Alternative::TwoSided => (2.0 * greater.min(less)).min(1.0),
    };

    let mean = draws.iter().sum::<f64>() / sims;
    let variance = if simulations > 1 {
        draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (sims - 1.0)
    } else {
        0.0
    };

    log::debug!("Permutation Moran's I {observed:.4} over {simulations} draws, p = {p_value:.4}");

    Ok(PermutationResult {
        statistic: observed,
        simulations,
        p_value,
        mean,
        variance,
        alternative: options.alternative,
    })
}

/// Moran's I of OLS residuals, with expectation and variance conditioned
/// on the design matrix through `M = I - X (X'X)^-1 X'`:
///
/// ```text
/// E[I] = (n / S0) tr(MW) / (n - k)
/// V[I] = (n / S0)^2 [tr(MWMW') + tr(MWMW) + tr(MW)^2] / ((n - k)(n - k + 2)) - E[I]^2
/// ```
///
/// # Errors
///
/// * [`AnalyticsError::DimensionMismatch`] if the fit and `weights`
///   disagree on the number of cells.
/// * [`AnalyticsError::EmptyNeighbourSets`] if there are islands and
///   `zero_policy` is off.
#[allow(clippy::cast_precision_loss)]
pub fn residual_moran_test(
    fit: &OlsFit,
    weights: &SpatialWeights,
    alternative: Alternative,
    zero_policy: bool,
) -> Result<ResidualMoranResult, AnalyticsError> {
    let design = fit.design();
    check_inputs(design.n(), weights, zero_policy)?;

    let n = design.n() as f64;
    let k = design.k() as f64;
    let scale = n / weights.s0();

    let e = fit.residuals();
    let we: DVector<f64> = lag(weights, e);
    let statistic = scale * e.dot(&we) / e.norm_squared();

    let x = design.x();
    let xt_w = times_weights(&x.transpose(), weights);
    let mw = dense_weights(weights) - x * (fit.xtx_inv() * xt_w);

    let tr_mw = mw.trace();
    let tr_mwmwt = mw.norm_squared();
    let tr_mwmw = trace_of_product(&mw, &mw);

    let expectation = scale * tr_mw / (n - k);
    let variance = scale * scale * (tr_mw.mul_add(tr_mw, tr_mwmwt + tr_mwmw))
        / ((n - k) * (n - k + 2.0))
        - expectation * expectation;
    let z_score = (statistic - expectation) / variance.sqrt();

    Ok(ResidualMoranResult {
        statistic,
        expectation,
        variance,
        z_score,
        p_value: normal_p_value(z_score, alternative),
        alternative,
    })
}

#[cfg(test)]
mod tests {
    use crime_spatial_spatial::{Neighbours, WeightStyle};

    use super::*;
    use crate::design::Design;
    use crate::ols::fit_ols;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(
            diff < tol,
            "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}"
        );
    }

    /// Queen contiguity on a `cols x rows` lattice, row-major.
    fn lattice(cols: usize, rows: usize) -> SpatialWeights {
        let lists = (0..rows * cols)
            .map(|i| {
                let (r, c) = (i / cols, i % cols);
                let mut list = Vec::new();
                for rr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
                    for cc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                        if (rr, cc) != (r, c) {
                            list.push(rr * cols + cc);
                        }
                    }
                }
                list
            })
            .collect();
        SpatialWeights::new(Neighbours::from_lists(lists).unwrap(), WeightStyle::W)
    }

    const GRADIENT: [f64; 9] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
    const CHECKERBOARD: [f64; 9] = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

    // Reference moments from exact rational arithmetic of the textbook
    // formulas.
    #[test]
    fn gradient_under_randomisation() {
        let result = moran_test(&GRADIENT, &lattice(3, 3), &MoranOptions::default()).unwrap();

        assert_close(result.statistic, 0.355_555_555_555_555_57, 1e-12, "I");
        assert_close(result.expectation, -0.125, 1e-12, "E[I]");
        assert_close(result.variance, 0.023_104_089_506_172_84, 1e-12, "V[I]");
        assert_close(result.z_score, 3.161_543_583_610_987_5, 1e-9, "z");
        assert_close(result.p_value, 0.001_569_353_313_602_756_3, 1e-9, "p");
        assert_eq!(result.n, 9);
        assert_eq!(result.islands, 0);
    }

    #[test]
    fn gradient_under_normality() {
        let options = MoranOptions {
            assumption: NullAssumption::Normality,
            alternative: Alternative::Greater,
            ..MoranOptions::default()
        };
        let result = moran_test(&GRADIENT, &lattice(3, 3), &options).unwrap();

        assert_close(result.variance, 0.020_862_654_320_987_654, 1e-12, "V[I]");
        assert_close(result.z_score, 3.327_046_120_844_82, 1e-9, "z");
        assert_close(result.p_value, 0.000_438_859_225_630_607_4, 1e-9, "p");
    }

    #[test]
    fn checkerboard_is_negative() {
        let result = moran_test(&CHECKERBOARD, &lattice(3, 3), &MoranOptions::default()).unwrap();

        assert_close(result.statistic, -0.233_333_333_333_333_34, 1e-12, "I");
        assert_close(result.variance, 0.025_665_729_717_813_05, 1e-12, "V[I]");
        assert_close(result.z_score, -0.676_215_775_165_679_7, 1e-9, "z");
    }

    #[test]
    fn islands_shrink_the_effective_n() {
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
        let x = [1.0, 3.0, 2.0, 5.0, 4.0, 9.0];

        let result = moran_test(&x, &weights, &MoranOptions::default()).unwrap();
        assert_eq!(result.n, 5);
        assert_eq!(result.islands, 1);
        assert_close(result.statistic, 0.1125, 1e-12, "I");
        assert_close(result.expectation, -0.25, 1e-12, "E[I]");
        assert_close(result.variance, 0.074_916_666_666_666_67, 1e-12, "V[I]");
        assert_close(result.p_value, 0.185_370_623_324_409_68, 1e-9, "p");

        let strict = MoranOptions {
            zero_policy: false,
            ..MoranOptions::default()
        };
        assert_eq!(
            moran_test(&x, &weights, &strict).unwrap_err(),
            AnalyticsError::EmptyNeighbourSets { count: 1 }
        );
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = moran_test(&[1.0, 2.0], &lattice(3, 3), &MoranOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::DimensionMismatch { expected: 9, actual: 2, .. }
        ));
    }

    #[test]
    fn permutation_is_reproducible_and_detects_gradient() {
        let weights = lattice(4, 4);
        let x: Vec<f64> = (0..16_i32).map(|i| f64::from(i / 4 + i % 4)).collect();
        let options = MoranOptions {
            alternative: Alternative::Greater,
            ..MoranOptions::default()
        };

        let a = moran_permutation_test(&x, &weights, &options, 499, 7).unwrap();
        let b = moran_permutation_test(&x, &weights, &options, 499, 7).unwrap();
        assert_eq!(a, b);

        let analytical = moran_test(&x, &weights, &options).unwrap();
        assert_close(a.statistic, analytical.statistic, 1e-12, "observed I");
        assert!(a.p_value < 0.01, "p = {}", a.p_value);
        assert!(a.mean < 0.0 && a.mean > -0.2, "mean = {}", a.mean);
        assert!(a.variance > 0.0);
    }

    #[test]
    fn permutation_p_value_is_bounded() {
        let options = MoranOptions::default();
        let result =
            moran_permutation_test(&CHECKERBOARD, &lattice(3, 3), &options, 99, 1).unwrap();
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
        assert!(moran_permutation_test(&CHECKERBOARD, &lattice(3, 3), &options, 0, 1).is_err());
    }

    #[test]
    fn residual_moran_matches_reference() {
        let design = Design::new(
            "y",
            vec![3.0, 5.0, 4.0, 8.0, 9.0, 7.0, 12.0, 11.0, 10.0],
            vec![(
                "x".to_string(),
                vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0, 8.0, 7.0, 9.0],
            )],
        )
        .unwrap();
        let fit = fit_ols(&design).unwrap();

        let result =
            residual_moran_test(&fit, &lattice(3, 3), Alternative::TwoSided, true).unwrap();
        assert_close(result.statistic, -0.018_136_412_875_270_815, 1e-12, "I");
        assert_close(result.expectation, -0.184_940_476_190_476_18, 1e-12, "E[I]");
        assert_close(result.variance, 0.017_827_101_223_719_94, 1e-12, "V[I]");
        assert_close(result.z_score, 1.249_298_620_837_080_4, 1e-9, "z");
        assert_close(result.p_value, 0.211_555_872_184_585_05, 1e-9, "p");
    }

    #[test]
    fn residual_moran_rejects_mismatched_weights() {
        let design = Design::new(
            "y",
            vec![3.0, 5.0, 4.0, 8.0, 9.0, 7.0, 12.0, 11.0, 10.0],
            vec![(
                "x".to_string(),
                vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0, 8.0, 7.0, 9.0],
            )],
        )
        .unwrap();
        let fit = fit_ols(&design).unwrap();

        let err = residual_moran_test(&fit, &lattice(2, 2), Alternative::TwoSided, true)
            .unwrap_err();
        assert!(
            matches!(
                err,
                AnalyticsError::DimensionMismatch {
                    expected: 4,
                    actual: 9,
                    ..
                }
            ),
            "{err}"
        );
    }
}
