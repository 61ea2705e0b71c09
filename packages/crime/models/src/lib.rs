#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point record types for the crime regression pipeline.
//!
//! Incident and bus-stop records are the two point collections that get
//! counted into the hexagon grid. Both are plain WGS84 longitude/latitude
//! points once ingestion has finished; nothing downstream mutates them.

use serde::{Deserialize, Serialize};

/// A single reported crime incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Crime category exactly as it appears in the source file
    /// (e.g. "Anti-social behaviour", "Burglary").
    pub category: String,
    /// WGS84 longitude.
    pub longitude: f64,
    /// WGS84 latitude.
    pub latitude: f64,
}

impl IncidentRecord {
    /// Returns the `(x, y)` pair used for spatial lookups.
    #[must_use]
    pub const fn lng_lat(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// A bus stop that survived the withdrawn-stop filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecord {
    /// Source identifier for the stop, if the layer carried one.
    pub id: Option<String>,
    /// WGS84 longitude.
    pub longitude: f64,
    /// WGS84 latitude.
    pub latitude: f64,
}

impl StopRecord {
    /// Returns the `(x, y)` pair used for spatial lookups.
    #[must_use]
    pub const fn lng_lat(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// Anything that can be dropped into a cell by location.
pub trait Located {
    /// Longitude/latitude of the record.
    fn location(&self) -> (f64, f64);
}

impl Located for IncidentRecord {
    fn location(&self) -> (f64, f64) {
        self.lng_lat()
    }
}

impl Located for StopRecord {
    fn location(&self) -> (f64, f64) {
        self.lng_lat()
    }
}

impl Located for (f64, f64) {
    fn location(&self) -> (f64, f64) {
        *self
    }
}

/// Counts incidents per category, sorted by descending count then name.
///
/// Used for the ingestion summary so a run shows what actually went into
/// the `total` column.
#[must_use]
pub fn category_counts(incidents: &[IncidentRecord]) -> Vec<(String, u64)> {
    let mut map = std::collections::BTreeMap::<&str, u64>::new();
    for incident in incidents {
        *map.entry(incident.category.as_str()).or_default() += 1;
    }

    let mut counts: Vec<(String, u64)> = map
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
