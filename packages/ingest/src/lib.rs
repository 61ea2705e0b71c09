#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loads the three input collections: incident points from CSV files,
//! the hexagon grid and the bus stops from `GeoJSON` or shapefile layers.
//!
//! Everything leaves this crate in WGS84 longitude/latitude. Records with
//! missing coordinates and withdrawn stops are filtered here, before any
//! spatial operation sees them.

pub mod incidents;
pub mod layers;
pub mod progress;
mod shp;

use std::path::PathBuf;
use std::sync::Arc;

use crime_spatial_crime_models::{IncidentRecord, StopRecord};
use crime_spatial_geography::ReprojectError;
use crime_spatial_geography_models::{CellTable, TableError};
use crime_spatial_ingest_models::{IngestConfig, IngestStats};
use thiserror::Error;

pub use incidents::{discover_incident_files, load_incidents};
pub use layers::{load_cells, load_stops};

use crate::progress::ProgressCallback;

/// Errors that can occur while loading input data.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No incident file matched the expected naming pattern.
    #[error("No files matching '{pattern}' found in {}", dir.display())]
    MissingFiles {
        /// Directory that was scanned.
        dir: PathBuf,
        /// Pattern the file names had to match.
        pattern: String,
    },

    /// A record lacks a required field or has an unusable value.
    ///
    /// `row` is the 1-based data row (or feature number); `0` refers to
    /// the header or the file as a whole.
    #[error("{}, row {row}: {message}", file.display())]
    MalformedRecord {
        /// File containing the record.
        file: PathBuf,
        /// 1-based record index, `0` for the header.
        row: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Reading a file failed.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The CSV reader failed.
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        source: csv::Error,
    },

    /// A layer is not valid `GeoJSON`.
    #[error("GeoJSON error in {}: {source}", path.display())]
    GeoJson {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        source: Box<geojson::Error>,
    },

    /// A shapefile layer (or its `.dbf` table) could not be read.
    #[error("Shapefile error in {}: {source}", path.display())]
    Shapefile {
        /// The `.shp` file being read.
        path: PathBuf,
        /// Underlying error.
        source: Box<shapefile::Error>,
    },

    /// Reprojecting coordinates to WGS84 failed.
    #[error(transparent)]
    Reproject(#[from] ReprojectError),

    /// Building the cell attribute table failed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// The three collections produced by [`ingest`], all in WGS84.
#[derive(Debug, Clone)]
pub struct IngestedData {
    /// Incident points from every matching file, in file then row order.
    pub incidents: Vec<IncidentRecord>,
    /// Hexagon cells with their `trips` column.
    pub cells: CellTable,
    /// Bus stops that are neither withdrawn nor missing geometry.
    pub stops: Vec<StopRecord>,
    /// What was read and what was dropped.
    pub stats: IngestStats,
}

/// Loads incidents, cells and stops as described by `config`.
///
/// # Errors
///
/// Returns [`IngestError::MissingFiles`] if no incident file matches, and
/// [`IngestError::MalformedRecord`] if any record lacks a required field.
/// Failures from any one input abort the whole run.
pub fn ingest(
    config: &IngestConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<IngestedData, IngestError> {
    let progress = progress.unwrap_or_else(progress::null_progress);
    let mut stats = IngestStats::default();

    let files = discover_incident_files(&config.incidents.dir, &config.incidents.suffix)?;
    log::info!(
        "Found {} incident files in {}",
        files.len(),
        config.incidents.dir.display()
    );

    let incidents = load_incidents(&files, &config.incidents, progress.as_ref(), &mut stats)?;
    if stats.incidents_missing_coordinates > 0 {
        log::warn!(
            "Dropped {} incidents with missing coordinates",
            stats.incidents_missing_coordinates
        );
    }
    if stats.incidents_filtered > 0 {
        log::info!(
            "Dropped {} incidents outside the category filter",
            stats.incidents_filtered
        );
    }
    log::info!("Loaded {} incidents", incidents.len());

    let cells = load_cells(&config.cells, &mut stats)?;
    let stops = load_stops(&config.stops, &mut stats)?;

    Ok(IngestedData {
        incidents,
        cells,
        stops,
        stats,
    })
}
