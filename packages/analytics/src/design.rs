//! Response vector and design matrix assembled from the cell table.

use crime_spatial_analytics_models::INTERCEPT;
use crime_spatial_geography_models::CellTable;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{AnalyticsError, check_len};

/// Which table columns form the regression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignSpec {
    /// Response column.
    pub response: String,
    /// Predictor columns, in coefficient order.
    pub predictors: Vec<String>,
}

/// A response vector `y` and design matrix `X` with a leading intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    response: String,
    names: Vec<String>,
    y: DVector<f64>,
    x: DMatrix<f64>,
}

impl Design {
    /// Builds a design from raw columns. An intercept column is prepended.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::DimensionMismatch`] if a predictor does not
    /// have one value per response value.
    pub fn new(
        response: impl Into<String>,
        y: Vec<f64>,
        predictors: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, AnalyticsError> {
        let n = y.len();
        for (name, values) in &predictors {
            check_len(&format!("predictor '{name}'"), n, values.len())?;
        }

        let k = predictors.len() + 1;
        let x = DMatrix::from_fn(n, k, |i, j| {
            if j == 0 { 1.0 } else { predictors[j - 1].1[i] }
        });

        let mut names = Vec::with_capacity(k);
        names.push(INTERCEPT.to_string());
        names.extend(predictors.into_iter().map(|(name, _)| name));

        Ok(Self {
            response: response.into(),
            names,
            y: DVector::from_vec(y),
            x,
        })
    }

    /// Reads the response and predictors from `table`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownColumn`] if a named column is
    /// missing from the table.
    pub fn from_table(table: &CellTable, spec: &DesignSpec) -> Result<Self, AnalyticsError> {
        let column = |name: &str| {
            table
                .get(name)
                .map(<[f64]>::to_vec)
                .ok_or_else(|| AnalyticsError::UnknownColumn {
                    column: name.to_string(),
                    available: table.column_names().collect::<Vec<_>>().join(", "),
                })
        };

        let y = column(&spec.response)?;
        let predictors = spec
            .predictors
            .iter()
            .map(|name| Ok((name.clone(), column(name)?)))
            .collect::<Result<Vec<_>, AnalyticsError>>()?;

        Self::new(spec.response.clone(), y, predictors)
    }

    /// Response column name.
    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Coefficient names: the intercept, then the predictors.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of observations.
    #[must_use]
    pub fn n(&self) -> usize {
        self.y.len()
    }

    /// Number of columns in `X`, intercept included.
    #[must_use]
    pub fn k(&self) -> usize {
        self.x.ncols()
    }

    /// Response vector.
    #[must_use]
    pub const fn y(&self) -> &DVector<f64> {
        &self.y
    }

    /// Design matrix.
    #[must_use]
    pub const fn x(&self) -> &DMatrix<f64> {
        &self.x
    }
}

#[cfg(test)]
mod tests {
    use crime_spatial_geography_models::{PolygonCell, TOTAL_COLUMN, TRIPS_COLUMN};
    use geo::MultiPolygon;

    use super::*;

    fn table() -> CellTable {
        let cells = (0..3)
            .map(|i| PolygonCell {
                id: format!("c{i}"),
                geometry: MultiPolygon(vec![]),
            })
            .collect();
        CellTable::new(cells)
            .with_column(TRIPS_COLUMN, vec![10.0, 20.0, 30.0])
            .unwrap()
            .with_column(TOTAL_COLUMN, vec![1.0, 0.0, 4.0])
            .unwrap()
    }

    #[test]
    fn intercept_is_prepended() {
        let spec = DesignSpec {
            response: TOTAL_COLUMN.to_string(),
            predictors: vec![TRIPS_COLUMN.to_string()],
        };
        let design = Design::from_table(&table(), &spec).unwrap();

        assert_eq!(design.names(), [INTERCEPT, TRIPS_COLUMN]);
        assert_eq!(design.n(), 3);
        assert_eq!(design.k(), 2);
        assert!((design.x()[(2, 0)] - 1.0).abs() < f64::EPSILON);
        assert!((design.x()[(2, 1)] - 30.0).abs() < f64::EPSILON);
        assert!((design.y()[2] - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_predictor_is_reported() {
        let spec = DesignSpec {
            response: TOTAL_COLUMN.to_string(),
            predictors: vec!["bus_stops".to_string()],
        };
        let err = Design::from_table(&table(), &spec).unwrap_err();
        assert_eq!(
            err,
            AnalyticsError::UnknownColumn {
                column: "bus_stops".to_string(),
                available: "trips, total".to_string(),
            }
        );
    }

    #[test]
    fn ragged_predictor_is_a_dimension_mismatch() {
        let err = Design::new("y", vec![1.0, 2.0], vec![("x".to_string(), vec![1.0])]).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::DimensionMismatch { expected: 2, actual: 1, .. }
        ));
    }
}
