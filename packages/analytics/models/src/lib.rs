#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Option and result types for the regression pipeline.
//!
//! Options are deserialised from the analysis config; results are
//! serialised into the JSON report. Neither carries any behaviour beyond
//! small helpers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name given to the intercept column of a design matrix.
pub const INTERCEPT: &str = "(Intercept)";

/// Null hypothesis under which the variance of Moran's I is derived.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NullAssumption {
    /// Values are a random permutation over the cells (kurtosis adjusted).
    #[default]
    #[serde(alias = "randomization")]
    #[strum(to_string = "randomisation", serialize = "randomization")]
    Randomisation,
    /// Values are independent draws from a normal distribution.
    Normality,
}

/// Alternative hypothesis for a test statistic.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Alternative {
    /// Statistic differs from its expectation in either direction.
    #[default]
    TwoSided,
    /// Statistic is larger than expected (positive autocorrelation).
    Greater,
    /// Statistic is smaller than expected (negative autocorrelation).
    Less,
}

/// How `ln|I - rho W|` is evaluated by the lag model.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JacobianMethod {
    /// Exact, from the eigenvalues of `W`.
    #[default]
    Eigen,
    /// Truncated power series with stochastic trace estimates.
    PowerSeries,
}

/// Options for the global Moran's I test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoranOptions {
    /// Variance assumption.
    pub assumption: NullAssumption,
    /// Alternative hypothesis.
    pub alternative: Alternative,
    /// Allow cells without neighbours. They get a zero lag and are left
    /// out of the effective cell count; when `false` they are an error.
    pub zero_policy: bool,
}

impl Default for MoranOptions {
    fn default() -> Self {
        Self {
            assumption: NullAssumption::default(),
            alternative: Alternative::default(),
            zero_policy: true,
        }
    }
}

/// Options for the maximum-likelihood spatial-lag fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagOptions {
    /// Log-Jacobian evaluation.
    pub method: JacobianMethod,
    /// Convergence tolerance on `rho`.
    pub tolerance: f64,
    /// Optimiser iteration cap.
    pub max_iterations: usize,
    /// Number of power-series terms.
    pub power_series_order: usize,
    /// Random probe vectors per stochastic trace estimate.
    pub trace_probes: usize,
    /// Seed for the trace probes.
    pub seed: u64,
    /// Evaluate the model at this `rho` instead of estimating it.
    pub fixed_rho: Option<f64>,
    /// Allow cells without neighbours.
    pub zero_policy: bool,
}

impl Default for LagOptions {
    fn default() -> Self {
        Self {
            method: JacobianMethod::default(),
            tolerance: 1e-10,
            max_iterations: 500,
            power_series_order: 30,
            trace_probes: 50,
            seed: 42,
            fixed_rho: None,
            zero_policy: true,
        }
    }
}

/// A chi-squared (or similar) test statistic with its p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStatistic {
    /// Value of the statistic.
    pub statistic: f64,
    /// Degrees of freedom of the reference distribution.
    pub df: f64,
    /// p-value.
    pub p_value: f64,
}

/// One row of a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coefficient {
    /// Column name (or [`INTERCEPT`]).
    pub name: String,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error.
    pub std_error: f64,
    /// `t` (OLS) or `z` (maximum likelihood) statistic.
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Ordinary least squares fit summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OlsSummary {
    /// Response column.
    pub response: String,
    /// Intercept first, then predictors in design order.
    pub coefficients: Vec<Coefficient>,
    /// Number of observations.
    pub n: usize,
    /// Number of estimated coefficients.
    pub k: usize,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// R-squared adjusted for the number of predictors.
    pub adj_r_squared: f64,
    /// `sqrt(RSS / (n - k))`.
    pub residual_std_error: f64,
    /// Residual degrees of freedom.
    pub df_residual: usize,
    /// Overall F test against the intercept-only model.
    pub f_statistic: f64,
    /// p-value of the F test.
    pub f_p_value: f64,
    /// Gaussian log-likelihood at the ML variance.
    pub log_likelihood: f64,
    /// Akaike information criterion (`k + 1` parameters).
    pub aic: f64,
    /// Residuals, one per cell in cell order.
    pub residuals: Vec<f64>,
    /// Fitted values, one per cell in cell order.
    pub fitted: Vec<f64>,
}

/// Global Moran's I test result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoranResult {
    /// Moran's I.
    pub statistic: f64,
    /// Expectation under the null.
    pub expectation: f64,
    /// Variance under the null.
    pub variance: f64,
    /// Standardised deviate.
    pub z_score: f64,
    /// p-value for `alternative`.
    pub p_value: f64,
    /// Variance assumption used.
    pub assumption: NullAssumption,
    /// Alternative hypothesis used.
    pub alternative: Alternative,
    /// Effective number of cells (islands excluded under zero policy).
    pub n: usize,
    /// Number of cells without neighbours.
    pub islands: usize,
}

/// Monte Carlo permutation test of Moran's I.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermutationResult {
    /// Observed Moran's I.
    pub statistic: f64,
    /// Number of permutations drawn.
    pub simulations: usize,
    /// Rank-based pseudo p-value, `(extreme + 1) / (simulations + 1)`.
    pub p_value: f64,
    /// Mean of the permutation distribution.
    pub mean: f64,
    /// Variance of the permutation distribution.
    pub variance: f64,
    /// Alternative hypothesis used.
    pub alternative: Alternative,
}

/// Moran's I of regression residuals with the regression-adjusted null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidualMoranResult {
    /// Moran's I of the residuals.
    pub statistic: f64,
    /// Expectation given the design matrix.
    pub expectation: f64,
    /// Variance given the design matrix.
    pub variance: f64,
    /// Standardised deviate.
    pub z_score: f64,
    /// p-value for `alternative`.
    pub p_value: f64,
    /// Alternative hypothesis used.
    pub alternative: Alternative,
}

/// Specification suggested by the Lagrange-multiplier tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelRecommendation {
    /// No significant spatial dependence; OLS is adequate.
    Ols,
    /// Spatial-lag (spatial autoregressive) model.
    SpatialLag,
    /// Spatial-error model.
    SpatialError,
}

/// The Lagrange-multiplier diagnostics for spatial dependence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LmDiagnostics {
    /// LM test for spatial error dependence.
    pub lm_error: TestStatistic,
    /// LM test for a missing spatially lagged response.
    pub lm_lag: TestStatistic,
    /// LM error test robust to a lag term.
    pub robust_lm_error: TestStatistic,
    /// LM lag test robust to error dependence.
    pub robust_lm_lag: TestStatistic,
    /// Joint test for both (`chi^2(2)`).
    pub sarma: TestStatistic,
    /// Significance level used by the decision rule.
    pub significance: f64,
    /// Outcome of the decision rule.
    pub recommendation: ModelRecommendation,
}

/// Direct, indirect and total effect of one predictor in a lag model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impact {
    /// Predictor name.
    pub name: String,
    /// Average own-cell effect, feedback included.
    pub direct: f64,
    /// Average spill-over effect on other cells.
    pub indirect: f64,
    /// `direct + indirect`.
    pub total: f64,
}

/// Maximum-likelihood spatial-lag fit summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LagSummary {
    /// Response column.
    pub response: String,
    /// Intercept first, then predictors (z tests).
    pub coefficients: Vec<Coefficient>,
    /// Spatial autoregressive coefficient with its asymptotic test.
    pub rho: Coefficient,
    /// Whether `rho` was fixed rather than estimated.
    pub rho_fixed: bool,
    /// Bounds `rho` was searched within.
    pub rho_interval: (f64, f64),
    /// Wald test of `rho = 0` (`z^2`).
    pub wald: TestStatistic,
    /// Likelihood ratio test against the OLS fit.
    pub likelihood_ratio: TestStatistic,
    /// LM test for remaining residual autocorrelation.
    pub residual_autocorrelation: TestStatistic,
    /// Maximised log-likelihood.
    pub log_likelihood: f64,
    /// AIC of the lag model (`k + 2` parameters).
    pub aic: f64,
    /// AIC of the OLS fit on the same design.
    pub ols_aic: f64,
    /// ML error variance.
    pub sigma2: f64,
    /// Nagelkerke pseudo R-squared against the intercept-only model.
    pub pseudo_r_squared: f64,
    /// Log-Jacobian method used.
    pub method: JacobianMethod,
    /// Optimiser iterations.
    pub iterations: usize,
    /// Effects of each predictor (intercept excluded).
    pub impacts: Vec<Impact>,
    /// Residuals `y - rho W y - X beta`, in cell order.
    pub residuals: Vec<f64>,
}

/// Significance code used in coefficient tables.
#[must_use]
pub fn significance_stars(p_value: f64) -> &'static str {
    if p_value < 0.001 {
        "***"
    } else if p_value < 0.01 {
        "**"
    } else if p_value < 0.05 {
        "*"
    } else if p_value < 0.1 {
        "."
    } else {
        ""
    }
}
