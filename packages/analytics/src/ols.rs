//! Ordinary least squares by Householder QR.

use crime_spatial_analytics_models::{Coefficient, OlsSummary};
use nalgebra::{DMatrix, DVector};

use crate::AnalyticsError;
use crate::design::Design;
use crate::distributions::{f_sf, student_t_two_sided};

/// Relative size below which a diagonal entry of `R` counts as zero.
/// Matches the default tolerance of R's `lm`.
const RANK_TOLERANCE: f64 = 1e-7;

/// A fitted OLS model.
#[derive(Debug, Clone)]
pub struct OlsFit {
    design: Design,
    coefficients: DVector<f64>,
    xtx_inv: DMatrix<f64>,
    fitted: DVector<f64>,
    residuals: DVector<f64>,
    rss: f64,
}

/// Fits `y = X b + e` by least squares.
///
/// # Errors
///
/// * [`AnalyticsError::SingularDesign`] if `X` is rank deficient, which
///   includes having fewer observations than columns.
/// * [`AnalyticsError::TooFewObservations`] if the fit would leave no
///   residual degrees of freedom.
pub fn fit_ols(design: &Design) -> Result<OlsFit, AnalyticsError> {
    let (n, k) = (design.n(), design.k());
    if n < k {
        return Err(AnalyticsError::SingularDesign {
            rank: n,
            columns: k,
        });
    }

    let x = design.x();
    let qr = x.clone().qr();
    let r = qr.r();

    let rank = column_rank(x, &r);
    let singular = AnalyticsError::SingularDesign { rank, columns: k };
    if rank < k {
        return Err(singular);
    }
    if n == k {
        return Err(AnalyticsError::TooFewObservations { n, required: k + 1 });
    }

    let qty = qr.q().transpose() * design.y();
    let coefficients = r.solve_upper_triangular(&qty).ok_or_else(|| singular.clone())?;
    let r_inv = r
        .solve_upper_triangular(&DMatrix::identity(k, k))
        .ok_or(singular)?;
    let xtx_inv = &r_inv * r_inv.transpose();

    let fitted = x * &coefficients;
    let residuals = design.y() - &fitted;
    let rss = residuals.norm_squared();

    log::debug!(
        "OLS {} on {} cells, {k} coefficients, RSS {rss:.6}",
        design.response(),
        n
    );

    Ok(OlsFit {
        design: design.clone(),
        coefficients,
        xtx_inv,
        fitted,
        residuals,
        rss,
    })
}

/// Number of columns whose `R` diagonal survives relative to the column
/// norm. Without pivoting a column that is a combination of earlier ones
/// collapses to (numerically) zero on the diagonal.
fn column_rank(x: &DMatrix<f64>, r: &DMatrix<f64>) -> usize {
    (0..x.ncols())
        .filter(|&j| r[(j, j)].abs() > RANK_TOLERANCE * x.column(j).norm())
        .count()
}

impl OlsFit {
    /// The design the model was fitted on.
    #[must_use]
    pub const fn design(&self) -> &Design {
        &self.design
    }

    /// Coefficient vector, intercept first.
    #[must_use]
    pub const fn coefficients(&self) -> &DVector<f64> {
        &self.coefficients
    }

    /// Estimate for the named coefficient.
    #[must_use]
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.design
            .names()
            .iter()
            .position(|n| n == name)
            .map(|j| self.coefficients[j])
    }

    /// `(X'X)^-1`.
    #[must_use]
    pub const fn xtx_inv(&self) -> &DMatrix<f64> {
        &self.xtx_inv
    }

    /// Fitted values `X b`.
    #[must_use]
    pub const fn fitted(&self) -> &DVector<f64> {
        &self.fitted
    }

    /// Residuals `y - X b`.
    #[must_use]
    pub const fn residuals(&self) -> &DVector<f64> {
        &self.residuals
    }

    /// Residual sum of squares.
    #[must_use]
    pub const fn rss(&self) -> f64 {
        self.rss
    }

    /// Residual degrees of freedom `n - k`.
    #[must_use]
    pub fn df_residual(&self) -> usize {
        self.design.n() - self.design.k()
    }

    /// Unbiased residual variance `RSS / (n - k)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sigma2(&self) -> f64 {
        self.rss / self.df_residual() as f64
    }

    /// Gaussian log-likelihood at the ML variance `RSS / n`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn log_likelihood(&self) -> f64 {
        let n = self.design.n() as f64;
        -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + (self.rss / n).ln() + 1.0)
    }

    /// AIC counting the `k` coefficients plus the variance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aic(&self) -> f64 {
        2.0f64.mul_add((self.design.k() + 1) as f64, -2.0 * self.log_likelihood())
    }

    /// Full coefficient table and goodness-of-fit statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> OlsSummary {
        let (n, k) = (self.design.n(), self.design.k());
        let df = self.df_residual() as f64;
        let sigma2 = self.sigma2();

        let coefficients = self
            .design
            .names()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let estimate = self.coefficients[j];
                let std_error = (sigma2 * self.xtx_inv[(j, j)]).sqrt();
                let statistic = estimate / std_error;
                Coefficient {
                    name: name.clone(),
                    estimate,
                    std_error,
                    statistic,
                    p_value: student_t_two_sided(statistic, df),
                }
            })
            .collect();

        let y = self.design.y();
        let mean = y.mean();
        let tss = y.map(|v| v - mean).norm_squared();
        let r_squared = 1.0 - self.rss / tss;
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df;

        let (f_statistic, f_p_value) = if k > 1 {
            let df_model = (k - 1) as f64;
            let f = ((tss - self.rss) / df_model) / sigma2;
            (f, f_sf(f, df_model, df))
        } else {
            (f64::NAN, f64::NAN)
        };

        OlsSummary {
            response: self.design.response().to_string(),
            coefficients,
            n,
            k,
            r_squared,
            adj_r_squared,
            residual_std_error: sigma2.sqrt(),
            df_residual: self.df_residual(),
            f_statistic,
            f_p_value,
            log_likelihood: self.log_likelihood(),
            aic: self.aic(),
            residuals: self.residuals.iter().copied().collect(),
            fitted: self.fitted.iter().copied().collect(),
        }
    }
}
