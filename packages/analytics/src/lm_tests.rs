//! Lagrange-multiplier diagnostics for spatial dependence in OLS
//! residuals, and the usual decision rule for choosing between the lag
//! and error specifications.

use crime_spatial_analytics_models::{LmDiagnostics, ModelRecommendation, TestStatistic};
use crime_spatial_spatial::SpatialWeights;

use crate::distributions::chi_squared_sf;
use crate::linalg::{annihilate, lag};
use crate::ols::OlsFit;
use crate::{AnalyticsError, check_islands, check_len};

fn chi_squared(statistic: f64, df: f64) -> TestStatistic {
    TestStatistic {
        statistic,
        df,
        p_value: chi_squared_sf(statistic, df),
    }
}

/// Runs LM-error, LM-lag, their robust forms and the joint SARMA test on
/// the residuals of `fit`, then applies [`recommend`] at `significance`.
///
/// Islands contribute zero rows to `W` when `zero_policy` is on.
///
/// # Errors
///
/// * [`AnalyticsError::DimensionMismatch`] if the fit and `weights`
///   disagree on the number of cells.
/// * [`AnalyticsError::EmptyNeighbourSets`] if there are islands and the
///   zero policy is off.
#[allow(clippy::cast_precision_loss, clippy::similar_names)]
pub fn lm_tests(
    fit: &OlsFit,
    weights: &SpatialWeights,
    significance: f64,
    zero_policy: bool,
) -> Result<LmDiagnostics, AnalyticsError> {
    let design = fit.design();
    check_len("weights", design.n(), weights.n())?;
    check_islands(weights, zero_policy)?;

    let n = design.n() as f64;
    let e = fit.residuals();
    let s2 = fit.rss() / n;

    let t = weights.trace_wtw() + weights.trace_w2();
    let d_err = e.dot(&lag(weights, e)) / s2;
    let d_lag = e.dot(&lag(weights, design.y())) / s2;

    let wxb = lag(weights, fit.fitted());
    let m_wxb = annihilate(design.x(), fit.xtx_inv(), &wxb);
    let nj = t.mul_add(s2, wxb.dot(&m_wxb)) / s2;

    let lm_err = d_err * d_err / t;
    let lm_lag = d_lag * d_lag / nj;
    let robust_err = (t / nj).mul_add(-d_lag, d_err).powi(2) / (t - t * t / nj);
    let robust_lag = (d_lag - d_err).powi(2) / (nj - t);

    let mut diagnostics = LmDiagnostics {
        lm_error: chi_squared(lm_err, 1.0),
        lm_lag: chi_squared(lm_lag, 1.0),
        robust_lm_error: chi_squared(robust_err, 1.0),
        robust_lm_lag: chi_squared(robust_lag, 1.0),
        sarma: chi_squared(robust_lag + lm_err, 2.0),
        significance,
        recommendation: ModelRecommendation::Ols,
    };
    diagnostics.recommendation = recommend(&diagnostics);

    log::debug!(
        "LM tests: err {lm_err:.4}, lag {lm_lag:.4}, robust err {robust_err:.4}, robust lag {robust_lag:.4} -> {}",
        diagnostics.recommendation
    );

    Ok(diagnostics)
}

/// The specification search rule:
///
/// 1. Neither LM-error nor LM-lag significant: OLS.
/// 2. Exactly one significant: that model.
/// 3. Both significant: the model whose robust test is significant; if
///    both or neither robust test is, the larger robust statistic wins.
#[must_use]
pub fn recommend(diagnostics: &LmDiagnostics) -> ModelRecommendation {
    let alpha = diagnostics.significance;
    let significant = |test: &TestStatistic| test.p_value < alpha;

    match (
        significant(&diagnostics.lm_error),
        significant(&diagnostics.lm_lag),
    ) {
        (false, false) => ModelRecommendation::Ols,
        (true, false) => ModelRecommendation::SpatialError,
        (false, true) => ModelRecommendation::SpatialLag,
        (true, true) => match (
            significant(&diagnostics.robust_lm_error),
            significant(&diagnostics.robust_lm_lag),
        ) {
            (true, false) => ModelRecommendation::SpatialError,
            (false, true) => ModelRecommendation::SpatialLag,
            _ => {
                if diagnostics.robust_lm_lag.statistic >= diagnostics.robust_lm_error.statistic {
                    ModelRecommendation::SpatialLag
                } else {
                    ModelRecommendation::SpatialError
                }
            }
        },
    }
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

    fn queen_3x3() -> SpatialWeights {
        let lists = (0..9_usize)
            .map(|i| {
                let (r, c) = (i / 3, i % 3);
                (0..9)
                    .filter(|&j| {
                        let (rr, cc) = (j / 3, j % 3);
                        j != i && r.abs_diff(rr) <= 1 && c.abs_diff(cc) <= 1
                    })
                    .collect()
            })
            .collect();
        SpatialWeights::new(Neighbours::from_lists(lists).unwrap(), WeightStyle::W)
    }

    fn fit() -> OlsFit {
        let design = Design::new(
            "y",
            vec![3.0, 5.0, 4.0, 8.0, 9.0, 7.0, 12.0, 11.0, 10.0],
            vec![(
                "x".to_string(),
                vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0, 8.0, 7.0, 9.0],
            )],
        )
        .unwrap();
        fit_ols(&design).unwrap()
    }

    fn stat(statistic: f64, p_value: f64) -> TestStatistic {
        TestStatistic {
            statistic,
            df: 1.0,
            p_value,
        }
    }

    // Reference values from exact rational arithmetic.
    #[test]
    fn matches_reference_statistics() {
        let lm = lm_tests(&fit(), &queen_3x3(), 0.05, false).unwrap();

        assert_close(lm.lm_error.statistic, 0.006_376_534_638_348_322, 1e-10, "LMerr");
        assert_close(lm.lm_error.p_value, 0.936_354_006_476_707_5, 1e-9, "LMerr p");
        assert_close(lm.lm_lag.statistic, 0.396_025_521_651_065_9, 1e-10, "LMlag");
        assert_close(lm.lm_lag.p_value, 0.529_149_014_466_371_6, 1e-9, "LMlag p");
        assert_close(lm.robust_lm_error.statistic, 2.756_307_307_534_333, 1e-9, "RLMerr");
        assert_close(lm.robust_lm_lag.statistic, 3.145_956_294_547_050_7, 1e-9, "RLMlag");
        assert_close(lm.robust_lm_lag.p_value, 0.076_115_370_878_315_34, 1e-9, "RLMlag p");
        assert_close(lm.sarma.statistic, 3.152_332_829_185_399, 1e-9, "SARMA");
        assert_close(lm.sarma.p_value, 0.206_766_236_815_439_26, 1e-9, "SARMA p");
        assert_eq!(lm.recommendation, ModelRecommendation::Ols);
    }

    #[test]
    fn sarma_decomposes_both_ways() {
        let lm = lm_tests(&fit(), &queen_3x3(), 0.05, false).unwrap();
        assert_close(
            lm.sarma.statistic,
            lm.robust_lm_error.statistic + lm.lm_lag.statistic,
            1e-9,
            "RLMerr + LMlag",
        );
    }

    #[test]
    fn decision_rule() {
        let mut lm = LmDiagnostics {
            lm_error: stat(5.0, 0.02),
            lm_lag: stat(1.0, 0.3),
            robust_lm_error: stat(4.5, 0.03),
            robust_lm_lag: stat(0.5, 0.5),
            sarma: stat(5.5, 0.06),
            significance: 0.05,
            recommendation: ModelRecommendation::Ols,
        };
        assert_eq!(recommend(&lm), ModelRecommendation::SpatialError);

        lm.lm_lag = stat(6.0, 0.01);
        assert_eq!(recommend(&lm), ModelRecommendation::SpatialError);

        lm.robust_lm_error = stat(0.1, 0.8);
        lm.robust_lm_lag = stat(4.0, 0.04);
        assert_eq!(recommend(&lm), ModelRecommendation::SpatialLag);

        lm.robust_lm_error = stat(2.0, 0.15);
        lm.robust_lm_lag = stat(3.0, 0.08);
        assert_eq!(recommend(&lm), ModelRecommendation::SpatialLag);

        lm.lm_error = stat(0.1, 0.9);
        lm.lm_lag = stat(0.2, 0.8);
        assert_eq!(recommend(&lm), ModelRecommendation::Ols);
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let small = SpatialWeights::new(
            Neighbours::from_lists(vec![vec![1], vec![0]]).unwrap(),
            WeightStyle::W,
        );
        assert!(matches!(
            lm_tests(&fit(), &small, 0.05, true),
            Err(AnalyticsError::DimensionMismatch { .. })
        ));
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
        let fit = fit_ols(&design).unwrap();

        assert!(lm_tests(&fit, &weights, 0.05, true).is_ok());
        assert_eq!(
            lm_tests(&fit, &weights, 0.05, false).unwrap_err(),
            AnalyticsError::EmptyNeighbourSets { count: 1 }
        );
    }
}
