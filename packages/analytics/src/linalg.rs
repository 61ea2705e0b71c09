//! Dense helpers around the sparse weights matrix.

use crime_spatial_spatial::SpatialWeights;
use nalgebra::{DMatrix, DVector};

/// `W` as a dense `n x n` matrix.
#[must_use]
pub fn dense_weights(weights: &SpatialWeights) -> DMatrix<f64> {
    let n = weights.n();
    let mut dense = DMatrix::zeros(n, n);
    for (i, j, w) in weights.entries() {
        dense[(i, j)] = w;
    }
    dense
}

/// `W v`.
#[must_use]
pub fn lag(weights: &SpatialWeights, v: &DVector<f64>) -> DVector<f64> {
    DVector::from_vec(weights.lag(v.as_slice()))
}

/// `W M` for a dense `M` with `n` rows.
#[must_use]
pub fn weights_times(weights: &SpatialWeights, m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(weights.n(), m.ncols());
    for (i, j, w) in weights.entries() {
        for c in 0..m.ncols() {
            out[(i, c)] += w * m[(j, c)];
        }
    }
    out
}

/// `M W` for a dense `M` with `n` columns.
#[must_use]
pub fn times_weights(m: &DMatrix<f64>, weights: &SpatialWeights) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(m.nrows(), weights.n());
    for (i, j, w) in weights.entries() {
        for r in 0..m.nrows() {
            out[(r, j)] += m[(r, i)] * w;
        }
    }
    out
}

/// `tr(A B)` without forming the product.
#[must_use]
pub fn trace_of_product(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    let mut sum = 0.0;
    for i in 0..a.nrows() {
        for j in 0..a.ncols() {
            sum += a[(i, j)] * b[(j, i)];
        }
    }
    sum
}

/// Residual-maker product `M v = v - X (X'X)^-1 X' v`.
#[must_use]
pub fn annihilate(x: &DMatrix<f64>, xtx_inv: &DMatrix<f64>, v: &DVector<f64>) -> DVector<f64> {
    v - x * (xtx_inv * (x.transpose() * v))
}
