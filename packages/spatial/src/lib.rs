#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial operations on the hexagon grid.
//!
//! - [`index::CellIndex`]: R-tree point-in-polygon lookups.
//! - [`aggregate`]: counting point collections into cells, producing new
//!   table columns.
//! - [`contiguity::Neighbours`] and [`weights::SpatialWeights`]: the
//!   neighbour structure consumed by the diagnostics and the lag model.

pub mod aggregate;
pub mod contiguity;
pub mod index;
pub mod weights;

use crime_spatial_geography_models::TableError;
use thiserror::Error;

pub use aggregate::{assign_points, attach_counts, count_points};
pub use contiguity::{ContiguityRule, DEFAULT_SNAP, Neighbours};
pub use index::CellIndex;
pub use weights::{SpatialWeights, WeightStyle, WeightsSummary};

/// Errors from building spatial structures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpatialError {
    /// A neighbour list refers to a cell that does not exist.
    #[error("cell {cell} lists neighbour {neighbour}, but there are only {cells} cells")]
    NeighbourOutOfRange {
        /// Cell whose list is wrong.
        cell: usize,
        /// Offending neighbour index.
        neighbour: usize,
        /// Number of cells.
        cells: usize,
    },

    /// A cell lists itself as a neighbour.
    #[error("cell {cell} lists itself as a neighbour")]
    SelfNeighbour {
        /// Offending cell.
        cell: usize,
    },

    /// Writing a column to the cell table failed.
    #[error(transparent)]
    Table(#[from] TableError),
}
