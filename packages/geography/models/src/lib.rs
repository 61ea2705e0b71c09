#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hexagon grid cell types and the immutable per-cell attribute table.
//!
//! A [`CellTable`] pairs the polygon cells with named numeric columns
//! (`trips`, `total`, `bus_stops`, ...). Adding a column produces a new
//! table; existing columns are never rewritten, so a value read by one
//! stage cannot change underneath a later one.

pub mod crs;

use std::sync::Arc;

use geo::MultiPolygon;
use thiserror::Error;

pub use crs::Crs;

/// Name of the pedestrian-trip estimate column carried by the grid layer.
pub const TRIPS_COLUMN: &str = "trips";

/// Name of the aggregated crime count column.
pub const TOTAL_COLUMN: &str = "total";

/// Name of the aggregated bus-stop count column.
pub const BUS_STOPS_COLUMN: &str = "bus_stops";

/// One hexagonal grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonCell {
    /// Unique identifier (from the layer, or `cell-<index>`).
    pub id: String,
    /// Cell boundary in WGS84 longitude/latitude.
    pub geometry: MultiPolygon<f64>,
}

/// Errors raised when building or reading a [`CellTable`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// A column did not have one value per cell.
    #[error("column '{column}' has {actual} values but the table has {expected} cells")]
    LengthMismatch {
        /// Column being added.
        column: String,
        /// Number of cells in the table.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A column with this name already exists.
    #[error("column '{column}' already exists")]
    DuplicateColumn {
        /// Offending column name.
        column: String,
    },

    /// No column with this name exists.
    #[error("unknown column '{column}' (available: {available})")]
    UnknownColumn {
        /// Requested column name.
        column: String,
        /// Comma-separated list of the columns that do exist.
        available: String,
    },
}

/// Polygon cells plus named numeric attribute columns, all in cell order.
///
/// Cloning is cheap: cells and column data are reference counted.
#[derive(Debug, Clone)]
pub struct CellTable {
    cells: Arc<[PolygonCell]>,
    columns: Vec<(String, Arc<[f64]>)>,
}

impl CellTable {
    /// Creates a table with no attribute columns.
    #[must_use]
    pub fn new(cells: Vec<PolygonCell>) -> Self {
        Self {
            cells: cells.into(),
            columns: Vec::new(),
        }
    }

    /// Number of cells (rows).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the table has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cells, in row order.
    #[must_use]
    pub fn cells(&self) -> &[PolygonCell] {
        &self.cells
    }

    /// Column names, in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Returns a new table with `values` added as column `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LengthMismatch`] if `values` does not have one
    /// entry per cell, or [`TableError::DuplicateColumn`] if the name is
    /// already taken.
    pub fn with_column(
        &self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, TableError> {
        let name = name.into();

        if values.len() != self.cells.len() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.cells.len(),
                actual: values.len(),
            });
        }

        if self.columns.iter().any(|(existing, _)| *existing == name) {
            return Err(TableError::DuplicateColumn { column: name });
        }

        let mut columns = self.columns.clone();
        columns.push((name, values.into()));

        Ok(Self {
            cells: Arc::clone(&self.cells),
            columns,
        })
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| &values[..])
    }

    /// Looks up a column by name, failing with the list of known columns.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::UnknownColumn`] if no such column exists.
    pub fn column(&self, name: &str) -> Result<&[f64], TableError> {
        self.get(name).ok_or_else(|| TableError::UnknownColumn {
            column: name.to_string(),
            available: self.column_names().collect::<Vec<_>>().join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon};

    use super::*;

    fn square(id: &str, x: f64) -> PolygonCell {
        let ring = LineString::from(vec![
            (x, 0.0),
            (x + 1.0, 0.0),
            (x + 1.0, 1.0),
            (x, 1.0),
            (x, 0.0),
        ]);
        PolygonCell {
            id: id.to_string(),
            geometry: MultiPolygon(vec![Polygon::new(ring, vec![])]),
        }
    }

    #[test]
    fn with_column_leaves_original_untouched() {
        let base = CellTable::new(vec![square("a", 0.0), square("b", 1.0)]);
        let with_trips = base.with_column(TRIPS_COLUMN, vec![10.0, 20.0]).unwrap();

        assert!(base.get(TRIPS_COLUMN).is_none());
        assert_eq!(with_trips.get(TRIPS_COLUMN), Some(&[10.0, 20.0][..]));
        assert_eq!(with_trips.len(), 2);
    }

    #[test]
    fn rejects_wrong_length() {
        let base = CellTable::new(vec![square("a", 0.0)]);
        let err = base.with_column("total", vec![1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            TableError::LengthMismatch {
                column: "total".to_string(),
                expected: 1,
                actual: 2,
            }
        );
    }

    #[test]
    fn rejects_duplicate_column() {
        let base = CellTable::new(vec![square("a", 0.0)])
            .with_column("total", vec![1.0])
            .unwrap();
        assert!(matches!(
            base.with_column("total", vec![2.0]),
            Err(TableError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn unknown_column_lists_available() {
        let table = CellTable::new(vec![square("a", 0.0)])
            .with_column(TRIPS_COLUMN, vec![1.0])
            .unwrap()
            .with_column(TOTAL_COLUMN, vec![3.0])
            .unwrap();
        let err = table.column("bus_stops").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown column 'bus_stops' (available: trips, total)"
        );
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["trips", "total"]);
    }
}
