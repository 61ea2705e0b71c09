//! Spatial weights on top of contiguity neighbours.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::contiguity::Neighbours;

/// How neighbour links are turned into weights.
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
pub enum WeightStyle {
    /// Row-standardised: each of a cell's `d` neighbours weighs `1/d`.
    #[default]
    W,
    /// Binary: every link weighs 1.
    B,
}

/// Sparse row-wise weights matrix `W`.
///
/// Rows follow cell order. Islands have an empty (all-zero) row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    neighbours: Neighbours,
    weights: Vec<Vec<f64>>,
    style: WeightStyle,
}

/// Headline numbers describing a weights matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightsSummary {
    /// Number of cells.
    pub cells: usize,
    /// Number of non-zero weights.
    pub links: usize,
    /// Share of the `n x n` matrix that is non-zero, in percent.
    pub percent_nonzero: f64,
    /// Mean neighbour count.
    pub mean_degree: f64,
    /// Smallest neighbour count.
    pub min_degree: usize,
    /// Largest neighbour count.
    pub max_degree: usize,
    /// Cells with no neighbours.
    pub islands: usize,
    /// Sum of all weights.
    pub s0: f64,
}

impl SpatialWeights {
    /// Weights for `neighbours` in the given style.
    #[must_use]
    pub fn new(neighbours: Neighbours, style: WeightStyle) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let weights = neighbours
            .iter()
            .map(|list| {
                let w = match style {
                    WeightStyle::W => 1.0 / list.len() as f64,
                    WeightStyle::B => 1.0,
                };
                vec![w; list.len()]
            })
            .collect();

        Self {
            neighbours,
            weights,
            style,
        }
    }

    /// Number of cells (rows).
    #[must_use]
    pub fn n(&self) -> usize {
        self.neighbours.len()
    }

    /// The weighting style.
    #[must_use]
    pub const fn style(&self) -> WeightStyle {
        self.style
    }

    /// The underlying neighbour lists.
    #[must_use]
    pub const fn neighbours(&self) -> &Neighbours {
        &self.neighbours
    }

    /// Row `i` as parallel `(columns, weights)` slices.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        (self.neighbours.of(i), &self.weights[i])
    }

    /// Weight `w_ij`, zero when `j` is not a neighbour of `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        let (cols, weights) = self.row(i);
        cols.binary_search(&j).map_or(0.0, |pos| weights[pos])
    }

    /// Every non-zero weight as `(i, j, w_ij)`, row by row.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n()).flat_map(move |i| {
            let (cols, weights) = self.row(i);
            cols.iter().zip(weights).map(move |(&j, &w)| (i, j, w))
        })
    }

    /// Cells with no neighbours.
    #[must_use]
    pub fn islands(&self) -> Vec<usize> {
        self.neighbours.islands()
    }

    /// Row sums `w_i.`.
    #[must_use]
    pub fn row_sums(&self) -> Vec<f64> {
        self.weights.iter().map(|row| row.iter().sum()).collect()
    }

    /// Column sums `w_.j`.
    #[must_use]
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n()];
        for (_, j, w) in self.entries() {
            sums[j] += w;
        }
        sums
    }

    /// `S0 = sum_ij w_ij`.
    #[must_use]
    pub fn s0(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }

    /// `S1 = 1/2 sum_ij (w_ij + w_ji)^2`.
    #[must_use]
    pub fn s1(&self) -> f64 {
        let mut total = 0.0;
        for (i, j, w) in self.entries() {
            let back = self.weight(j, i);
            total += (w + back).powi(2);
            if self.neighbours.of(j).binary_search(&i).is_err() {
                // The (j, i) term is never visited by the loop.
                total += w.powi(2);
            }
        }
        total / 2.0
    }

    /// `S2 = sum_i (w_i. + w_.i)^2`.
    #[must_use]
    pub fn s2(&self) -> f64 {
        self.row_sums()
            .iter()
            .zip(self.col_sums())
            .map(|(r, c)| (r + c).powi(2))
            .sum()
    }

    /// Spatial lag `W x`.
    ///
    /// # Panics
    ///
    /// Panics if `x` has fewer than [`Self::n`] entries.
    #[must_use]
    pub fn lag(&self, x: &[f64]) -> Vec<f64> {
        (0..self.n())
            .map(|i| {
                let (cols, weights) = self.row(i);
                cols.iter().zip(weights).map(|(&j, w)| w * x[j]).sum()
            })
            .collect()
    }

    /// Transposed lag `W' x`.
    ///
    /// # Panics
    ///
    /// Panics if `x` has fewer than [`Self::n`] entries.
    #[must_use]
    pub fn transpose_lag(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n()];
        for (i, j, w) in self.entries() {
            out[j] += w * x[i];
        }
        out
    }

    /// `tr(W)`; zero for contiguity weights, which have no self links.
    #[must_use]
    pub fn trace(&self) -> f64 {
        (0..self.n()).map(|i| self.weight(i, i)).sum()
    }

    /// `tr(W W) = sum_ij w_ij w_ji`.
    #[must_use]
    pub fn trace_w2(&self) -> f64 {
        self.entries().map(|(i, j, w)| w * self.weight(j, i)).sum()
    }

    /// `tr(W' W) = sum_ij w_ij^2`.
    #[must_use]
    pub fn trace_wtw(&self) -> f64 {
        self.weights.iter().flatten().map(|w| w * w).sum()
    }

    /// Whether `w_ij == w_ji` for every pair.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.entries()
            .all(|(i, j, w)| (w - self.weight(j, i)).abs() <= 1e-12 * w.abs().max(1.0))
    }

    /// Headline numbers for reporting.
    #[must_use]
    pub fn summary(&self) -> WeightsSummary {
        let n = self.n();
        let degrees: Vec<usize> = self.neighbours.iter().map(<[usize]>::len).collect();
        let links = self.neighbours.links();

        #[allow(clippy::cast_precision_loss)]
        let (percent_nonzero, mean_degree) = if n == 0 {
            (0.0, 0.0)
        } else {
            (
                100.0 * links as f64 / (n * n) as f64,
                links as f64 / n as f64,
            )
        };

        WeightsSummary {
            cells: n,
            links,
            percent_nonzero,
            mean_degree,
            min_degree: degrees.iter().copied().min().unwrap_or(0),
            max_degree: degrees.iter().copied().max().unwrap_or(0),
            islands: degrees.iter().filter(|d| **d == 0).count(),
            s0: self.s0(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contiguity::{ContiguityRule, DEFAULT_SNAP};
    use crate::index::tests::square_grid;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(
            diff < tol,
            "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}"
        );
    }

    fn queen_3x3(style: WeightStyle) -> SpatialWeights {
        let nb = Neighbours::from_cells(&square_grid(3, 3), ContiguityRule::Queen, DEFAULT_SNAP);
        SpatialWeights::new(nb, style)
    }

    #[test]
    fn row_standardised_rows_sum_to_one() {
        let w = queen_3x3(WeightStyle::W);
        for sum in w.row_sums() {
            assert_close(sum, 1.0, 1e-12, "row sum");
        }
        assert_close(w.s0(), 9.0, 1e-12, "S0");
        assert_close(w.weight(4, 0), 0.125, 1e-12, "centre to corner");
        assert_close(w.weight(0, 4), 1.0 / 3.0, 1e-12, "corner to centre");
        assert!(w.weight(0, 8).abs() < f64::EPSILON);
        assert!(!w.is_symmetric());
    }

    // Hand-computed for the 3x3 queen grid, row-standardised:
    //   S1 = 1/2 sum (w_ij + w_ji)^2 = 4.178333...
    //   S2 = sum (1 + col_sum_i)^2    = 38.333888...
    #[test]
    fn s1_s2_match_hand_computation() {
        let w = queen_3x3(WeightStyle::W);
        assert_close(w.s1(), 4.178_333_333_333_334, 1e-12, "S1");
        assert_close(w.s2(), 38.333_888_888_888_886, 1e-10, "S2");
    }

    #[test]
    fn binary_weights_are_symmetric() {
        let w = queen_3x3(WeightStyle::B);
        assert!(w.is_symmetric());
        assert_close(w.s0(), 40.0, 1e-12, "S0");
        assert_close(w.s1(), 80.0, 1e-12, "S1 = 2 * S0 for binary");
        assert_close(w.trace_w2(), 40.0, 1e-12, "tr(WW)");
        assert_close(w.trace_wtw(), 40.0, 1e-12, "tr(W'W)");
    }

    #[test]
    fn lag_and_transpose_lag() {
        let w = queen_3x3(WeightStyle::W);
        let x: Vec<f64> = (0..9).map(f64::from).collect();

        let lag = w.lag(&x);
        assert_close(lag[0], (1.0 + 3.0 + 4.0) / 3.0, 1e-12, "lag of corner");
        assert_close(lag[4], 4.0, 1e-12, "lag of centre");

        // <W x, y> == <x, W' y>
        let y: Vec<f64> = (0..9).map(|i| f64::from(i * i) - 3.0).collect();
        let lhs: f64 = lag.iter().zip(&y).map(|(a, b)| a * b).sum();
        let rhs: f64 = x.iter().zip(w.transpose_lag(&y)).map(|(a, b)| a * b).sum();
        assert_close(lhs, rhs, 1e-9, "adjoint identity");
    }

    #[test]
    fn islands_have_zero_rows() {
        let nb = Neighbours::from_lists(vec![vec![1], vec![0], vec![]]).unwrap();
        let w = SpatialWeights::new(nb, WeightStyle::W);
        assert_eq!(w.islands(), [2]);
        assert_eq!(w.lag(&[1.0, 2.0, 3.0]), [2.0, 1.0, 0.0]);

        let summary = w.summary();
        assert_eq!(summary.islands, 1);
        assert_eq!(summary.links, 2);
        assert_eq!(summary.min_degree, 0);
        assert_eq!(summary.max_degree, 1);
        assert_close(summary.s0, 2.0, 1e-12, "S0");
    }

    #[test]
    fn asymmetric_link_counts_once_in_s1() {
        // Single directed link 0 -> 1 with weight 1: S1 = 1/2 (1^2 + 1^2).
        let nb = Neighbours::from_lists(vec![vec![1], vec![]]).unwrap();
        let w = SpatialWeights::new(nb, WeightStyle::B);
        assert_close(w.s1(), 1.0, 1e-12, "S1");
        assert_close(w.s2(), 2.0, 1e-12, "S2");
    }

    #[test]
    fn style_parses() {
        assert_eq!("W".parse::<WeightStyle>().unwrap(), WeightStyle::W);
        assert_eq!("B".parse::<WeightStyle>().unwrap(), WeightStyle::B);
        assert_eq!(WeightStyle::default(), WeightStyle::W);
    }
}
