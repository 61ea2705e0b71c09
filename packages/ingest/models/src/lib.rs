#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion configuration and statistics types.
//!
//! Every field that has a sensible default carries one, so a config file
//! only needs to name the input paths.

use std::path::PathBuf;

use crime_spatial_geography_models::Crs;
use serde::{Deserialize, Serialize};

/// File-name suffix that identifies monthly street-level incident files.
pub const DEFAULT_INCIDENT_SUFFIX: &str = "-street.csv";

/// Where incident files live and how their columns are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncidentSource {
    /// Directory scanned (non-recursively) for incident files.
    pub dir: PathBuf,
    /// Only files whose name ends with this suffix are read.
    #[serde(default = "default_incident_suffix")]
    pub suffix: String,
    /// Header of the crime category column.
    #[serde(default = "default_category_column")]
    pub category_column: String,
    /// Header of the longitude (or easting) column.
    #[serde(default = "default_longitude_column")]
    pub longitude_column: String,
    /// Header of the latitude (or northing) column.
    #[serde(default = "default_latitude_column")]
    pub latitude_column: String,
    /// CRS the coordinate columns are expressed in. WGS84 when unset.
    #[serde(default)]
    pub crs: Option<Crs>,
    /// When set, only incidents whose category is listed are kept.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl IncidentSource {
    /// Incident files in `dir` with every other setting at its default.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            suffix: default_incident_suffix(),
            category_column: default_category_column(),
            longitude_column: default_longitude_column(),
            latitude_column: default_latitude_column(),
            crs: None,
            categories: None,
        }
    }
}

/// The hexagon grid layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CellLayer {
    /// Path to a `GeoJSON` `FeatureCollection` or a `.shp` shapefile of
    /// polygons.
    pub path: PathBuf,
    /// Feature property holding the cell identifier. Cells without it
    /// are named `cell-<index>`.
    #[serde(default)]
    pub id_property: Option<String>,
    /// Feature property holding the pedestrian-trip estimate.
    #[serde(default = "default_trips_property")]
    pub trips_property: String,
    /// Overrides the CRS declared by the file or its `.prj` sidecar.
    #[serde(default)]
    pub crs: Option<Crs>,
}

impl CellLayer {
    /// The grid layer at `path` with default property names.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_property: None,
            trips_property: default_trips_property(),
            crs: None,
        }
    }
}

/// The bus-stop layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StopLayer {
    /// Path to a `GeoJSON` `FeatureCollection` or a `.shp` shapefile of
    /// points.
    pub path: PathBuf,
    /// Feature property flagging withdrawn stops.
    #[serde(default = "default_withdrawn_property")]
    pub withdrawn_property: String,
    /// Overrides the CRS declared by the file or its `.prj` sidecar.
    #[serde(default)]
    pub crs: Option<Crs>,
}

impl StopLayer {
    /// The stop layer at `path` with default property names.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            withdrawn_property: default_withdrawn_property(),
            crs: None,
        }
    }
}

/// Everything needed to load the three input collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Incident CSV files.
    pub incidents: IncidentSource,
    /// Hexagon grid.
    pub cells: CellLayer,
    /// Bus stops.
    pub stops: StopLayer,
}

/// Counts reported by an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Number of incident files read.
    pub incident_files: u64,
    /// Incident rows read across all files.
    pub incident_rows: u64,
    /// Incident rows dropped for an empty or `NA` coordinate.
    pub incidents_missing_coordinates: u64,
    /// Incident rows dropped by the category allow-list.
    pub incidents_filtered: u64,
    /// Polygon cells loaded.
    pub cells: u64,
    /// Stop features read.
    pub stop_features: u64,
    /// Stops dropped because they are flagged as withdrawn.
    pub stops_withdrawn: u64,
    /// Stops dropped because they have no geometry.
    pub stops_missing_geometry: u64,
}

impl IngestStats {
    /// Incidents that survived filtering.
    #[must_use]
    pub const fn incidents_kept(&self) -> u64 {
        self.incident_rows
            .saturating_sub(self.incidents_missing_coordinates)
            .saturating_sub(self.incidents_filtered)
    }

    /// Stops that survived filtering.
    #[must_use]
    pub const fn stops_kept(&self) -> u64 {
        self.stop_features
            .saturating_sub(self.stops_withdrawn)
            .saturating_sub(self.stops_missing_geometry)
    }
}

fn default_incident_suffix() -> String {
    DEFAULT_INCIDENT_SUFFIX.to_string()
}

fn default_category_column() -> String {
    "Crime type".to_string()
}

fn default_longitude_column() -> String {
    "Longitude".to_string()
}

fn default_latitude_column() -> String {
    "Latitude".to_string()
}

fn default_trips_property() -> String {
    "trips".to_string()
}

fn default_withdrawn_property() -> String {
    "WITHDRAWN_".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
            [incidents]
            dir = "data/crime"

            [cells]
            path = "data/hexagons.geojson"

            [stops]
            path = "data/stops.geojson"
            crs = "EPSG:27700"
            "#,
        )
        .unwrap();

        assert_eq!(config.incidents, IncidentSource::new("data/crime"));
        assert_eq!(config.cells, CellLayer::new("data/hexagons.geojson"));
        assert_eq!(config.stops.withdrawn_property, "WITHDRAWN_");
        assert_eq!(config.stops.crs, Some(Crs::from_epsg(27_700)));
    }

    #[test]
    fn kept_counts_subtract_drops() {
        let stats = IngestStats {
            incident_rows: 10,
            incidents_missing_coordinates: 2,
            incidents_filtered: 3,
            stop_features: 4,
            stops_withdrawn: 1,
            ..IngestStats::default()
        };
        assert_eq!(stats.incidents_kept(), 5);
        assert_eq!(stats.stops_kept(), 3);
    }
}
