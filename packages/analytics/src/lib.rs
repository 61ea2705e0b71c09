#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Regression and spatial-dependence statistics for the cell table.
//!
//! - [`ols`]: ordinary least squares by QR.
//! - [`moran`]: global Moran's I on a variable or on OLS residuals, with
//!   analytical and permutation inference.
//! - [`lm_tests`]: Lagrange-multiplier tests for lag and error dependence.
//! - [`lag`]: maximum-likelihood spatial-lag model.
//!
//! Quantities that need the full `n x n` structure (the regression-adjusted
//! Moran variance, the lag-model information matrix) are computed densely,
//! which is comfortable up to a few thousand cells.

pub mod design;
pub mod distributions;
pub mod jacobian;
pub mod lag;
pub mod linalg;
pub mod lm_tests;
pub mod moran;
pub mod ols;
pub mod optimize;

use crime_spatial_spatial::SpatialWeights;
use thiserror::Error;

pub use design::Design;
pub use lag::{LagFit, fit_lag};
pub use lm_tests::{lm_tests, recommend};
pub use moran::{moran_permutation_test, moran_test, residual_moran_test};
pub use ols::{OlsFit, fit_ols};

/// Errors that can occur during model fitting and testing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyticsError {
    /// The design matrix does not have full column rank.
    #[error("Design matrix is rank deficient: rank {rank} < {columns} columns")]
    SingularDesign {
        /// Numerical rank.
        rank: usize,
        /// Number of columns (intercept included).
        columns: usize,
    },

    /// Two inputs that must line up have different sizes.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being compared.
        what: String,
        /// Size required.
        expected: usize,
        /// Size supplied.
        actual: usize,
    },

    /// The likelihood optimiser ran out of iterations.
    #[error("Optimisation did not converge within {iterations} iterations (tolerance {tolerance})")]
    NonConvergence {
        /// Iteration budget that was exhausted.
        iterations: usize,
        /// Requested tolerance.
        tolerance: f64,
    },

    /// Some cells have no neighbours and the zero policy is off.
    #[error("{count} cells have no neighbours (enable zero_policy to allow this)")]
    EmptyNeighbourSets {
        /// Number of neighbourless cells.
        count: usize,
    },

    /// A requested column is not in the cell table.
    #[error("Unknown column '{column}' (available: {available})")]
    UnknownColumn {
        /// Requested name.
        column: String,
        /// Comma-separated list of existing columns.
        available: String,
    },

    /// Not enough observations for the requested computation.
    #[error("Need at least {required} observations, got {n}")]
    TooFewObservations {
        /// Observations available.
        n: usize,
        /// Minimum required.
        required: usize,
    },

    /// A fixed `rho` lies outside the stationary interval.
    #[error("rho = {rho} lies outside the admissible interval ({lower}, {upper})")]
    RhoOutOfBounds {
        /// Requested value.
        rho: f64,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// `I - rho W` has no inverse at the fitted `rho`.
    #[error("I - rho W is singular at rho = {rho}")]
    SingularSpatialFilter {
        /// The `rho` at which inversion failed.
        rho: f64,
    },
}

/// Number of islands in `weights`, or [`AnalyticsError::EmptyNeighbourSets`]
/// if there are any and `zero_policy` is off.
pub(crate) fn check_islands(
    weights: &SpatialWeights,
    zero_policy: bool,
) -> Result<usize, AnalyticsError> {
    let islands = weights.islands().len();
    if islands > 0 && !zero_policy {
        return Err(AnalyticsError::EmptyNeighbourSets { count: islands });
    }
    Ok(islands)
}

/// Fails with [`AnalyticsError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), AnalyticsError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AnalyticsError::DimensionMismatch {
            what: what.to_string(),
            expected,
            actual,
        })
    }
}
