//! Incident CSV discovery and parsing.
//!
//! Incident files are the monthly street-level extracts: one row per
//! crime with at least a category, a longitude and a latitude column.
//! Files are found by suffix and concatenated in file-name order.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crime_spatial_crime_models::IncidentRecord;
use crime_spatial_geography::Reprojector;
use crime_spatial_ingest_models::{IncidentSource, IngestStats};
use csv::StringRecord;

use crate::IngestError;
use crate::progress::ProgressCallback;

/// Lists the files in `dir` whose name ends with `suffix`, sorted by name.
///
/// The scan is not recursive.
///
/// # Errors
///
/// Returns [`IngestError::MissingFiles`] if the directory does not exist or
/// contains no matching file, and [`IngestError::Io`] if it cannot be read.
pub fn discover_incident_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, IngestError> {
    let missing = || IngestError::MissingFiles {
        dir: dir.to_path_buf(),
        pattern: format!("*{suffix}"),
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(missing()),
        Err(source) => {
            return Err(IngestError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| IngestError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();

        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix));

        if matches && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(missing());
    }

    files.sort();
    Ok(files)
}

/// Reads and concatenates every incident file.
///
/// Rows with an empty or `NA` coordinate are dropped and counted in
/// `stats`, as are rows rejected by the category allow-list. Coordinates
/// declared in a projected CRS are reprojected to WGS84.
///
/// # Errors
///
/// Returns [`IngestError::MalformedRecord`] if a file lacks a required
/// column, a row is shorter than the header, or a coordinate is not a
/// number. I/O and CSV errors are reported with the file path.
pub fn load_incidents(
    files: &[PathBuf],
    source: &IncidentSource,
    progress: &dyn ProgressCallback,
    stats: &mut IngestStats,
) -> Result<Vec<IncidentRecord>, IngestError> {
    let reprojector = match source.crs {
        Some(crs) if !crs.is_wgs84() => Some(Reprojector::to_wgs84(crs)?),
        _ => None,
    };

    progress.set_total(files.len() as u64);

    let mut incidents = Vec::new();
    for file in files {
        progress.set_message(format!("Reading {}", file.display()));

        let before = incidents.len();
        read_incident_file(file, source, reprojector.as_ref(), &mut incidents, stats)?;
        stats.incident_files += 1;

        log::debug!("{}: {} incidents", file.display(), incidents.len() - before);
        progress.inc(1);
    }

    progress.finish(format!("Read {} incidents", incidents.len()));
    Ok(incidents)
}

/// Positions of the required columns within a file's header.
struct ColumnIndices {
    category: usize,
    longitude: usize,
    latitude: usize,
}

fn read_incident_file(
    file: &Path,
    source: &IncidentSource,
    reprojector: Option<&Reprojector>,
    out: &mut Vec<IncidentRecord>,
    stats: &mut IngestStats,
) -> Result<(), IngestError> {
    let csv_error = |source| IngestError::Csv {
        path: file.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(file)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let columns = locate_columns(file, &headers, source)?;

    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(csv_error)?;
        stats.incident_rows += 1;

        if record.len() < headers.len() {
            return Err(IngestError::MalformedRecord {
                file: file.to_path_buf(),
                row,
                message: format!(
                    "row has {} fields but the header has {}",
                    record.len(),
                    headers.len()
                ),
            });
        }

        let field = |idx: usize| record.get(idx).unwrap_or_default();

        let longitude = parse_coordinate(
            file,
            row,
            &source.longitude_column,
            field(columns.longitude),
        )?;
        let latitude = parse_coordinate(
            file,
            row,
            &source.latitude_column,
            field(columns.latitude),
        )?;

        let (Some(x), Some(y)) = (longitude, latitude) else {
            stats.incidents_missing_coordinates += 1;
            continue;
        };

        let category = field(columns.category).trim().to_string();
        let allowed = source
            .categories
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|c| *c == category));
        if !allowed {
            stats.incidents_filtered += 1;
            continue;
        }

        let (longitude, latitude) = match reprojector {
            Some(reprojector) => reprojector.point(x, y)?,
            None => (x, y),
        };

        out.push(IncidentRecord {
            category,
            longitude,
            latitude,
        });
    }

    Ok(())
}

fn locate_columns(
    file: &Path,
    headers: &StringRecord,
    source: &IncidentSource,
) -> Result<ColumnIndices, IngestError> {
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();

    let find = |name: &str| {
        let wanted = normalize_header(name);
        normalized
            .iter()
            .position(|h| *h == wanted)
            .ok_or_else(|| IngestError::MalformedRecord {
                file: file.to_path_buf(),
                row: 0,
                message: format!(
                    "missing required column '{name}' (found: {})",
                    headers.iter().collect::<Vec<_>>().join(", ")
                ),
            })
    };

    Ok(ColumnIndices {
        category: find(&source.category_column)?,
        longitude: find(&source.longitude_column)?,
        latitude: find(&source.latitude_column)?,
    })
}

/// Header comparison key: case-insensitive, with `.`, `_` and whitespace
/// all treated as a single space, so `Crime.type` matches `Crime type`.
fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split(|c: char| c == '.' || c == '_' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Ok(None)` for an empty or `NA` cell, the parsed value otherwise.
fn parse_coordinate(
    file: &Path,
    row: usize,
    column: &str,
    raw: &str,
) -> Result<Option<f64>, IngestError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("NA") {
        return Ok(None);
    }

    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| IngestError::MalformedRecord {
            file: file.to_path_buf(),
            row,
            message: format!("column '{column}' value '{raw}' is not a finite number"),
        })
}
