//! Geometry layers: the hexagon grid and the bus stops.
//!
//! A layer is either a `GeoJSON` `FeatureCollection` or, for paths ending
//! in `.shp`, an ESRI shapefile. `GeoJSON` layers may declare their CRS
//! through the legacy top-level `crs` member (named or EPSG style);
//! shapefiles through their `.prj` sidecar. A configured override wins
//! over the declaration; with neither, coordinates are taken as WGS84.

use std::path::Path;

use crime_spatial_crime_models::StopRecord;
use crime_spatial_geography::Reprojector;
use crime_spatial_geography_models::{CellTable, Crs, PolygonCell, TRIPS_COLUMN};
use crime_spatial_ingest_models::{CellLayer, IngestStats, StopLayer};
use geo::MultiPolygon;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::Value;

use crate::IngestError;
use crate::shp;

/// A layer read from disk, before any reprojection.
pub(crate) struct Layer {
    pub(crate) features: Vec<LayerFeature>,
    pub(crate) declared_crs: Option<Crs>,
}

/// One feature of a layer in either format.
pub(crate) struct LayerFeature {
    pub(crate) id: Option<String>,
    pub(crate) properties: Properties,
    pub(crate) geometry: Option<geo::Geometry<f64>>,
}

pub(crate) enum Properties {
    Json(JsonObject),
    Dbase(shapefile::dbase::Record),
}

impl LayerFeature {
    fn property(&self, name: &str) -> Option<Value> {
        match &self.properties {
            Properties::Json(properties) => properties.get(name).cloned(),
            Properties::Dbase(record) => record.get(name).map(shp::field_to_value),
        }
    }
}

fn read_layer(path: &Path) -> Result<Layer, IngestError> {
    let is_shapefile = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"));
    if is_shapefile {
        shp::read_shapefile(path)
    } else {
        read_geojson(path)
    }
}

/// Loads the hexagon grid as a [`CellTable`] carrying the `trips` column.
///
/// # Errors
///
/// Returns [`IngestError::MalformedRecord`] (with the 1-based feature
/// number) for a feature without polygon geometry or without a numeric
/// trips value.
pub fn load_cells(layer: &CellLayer, stats: &mut IngestStats) -> Result<CellTable, IngestError> {
    let path = layer.path.as_path();
    let source = read_layer(path)?;
    let reprojector = layer_reprojector(path, source.declared_crs, layer.crs)?;

    let mut cells = Vec::with_capacity(source.features.len());
    let mut trips = Vec::with_capacity(source.features.len());

    for (i, feature) in source.features.into_iter().enumerate() {
        let row = i + 1;
        let malformed = |message: String| IngestError::MalformedRecord {
            file: path.to_path_buf(),
            row,
            message,
        };

        let id = layer
            .id_property
            .as_deref()
            .and_then(|name| feature.property(name))
            .as_ref()
            .and_then(property_to_string)
            .or_else(|| feature.id.clone())
            .unwrap_or_else(|| format!("cell-{i}"));

        let value = feature
            .property(&layer.trips_property)
            .as_ref()
            .and_then(property_to_f64)
            .ok_or_else(|| {
                malformed(format!(
                    "cell '{id}' has no numeric '{}' property",
                    layer.trips_property
                ))
            })?;

        let geometry = feature
            .geometry
            .ok_or_else(|| malformed(format!("cell '{id}' has no geometry")))?;
        let polygons = match geometry {
            geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
            geo::Geometry::MultiPolygon(polygons) => polygons,
            other => {
                return Err(malformed(format!(
                    "cell '{id}' is a {}, expected a polygon",
                    geometry_kind(&other)
                )));
            }
        };

        let polygons = match &reprojector {
            Some(reprojector) => reprojector.geometry(&polygons)?,
            None => polygons,
        };

        cells.push(PolygonCell {
            id,
            geometry: polygons,
        });
        trips.push(value);
    }

    stats.cells = cells.len() as u64;
    log::info!("Loaded {} cells from {}", cells.len(), path.display());

    Ok(CellTable::new(cells).with_column(TRIPS_COLUMN, trips)?)
}

/// Loads the bus stops, dropping withdrawn stops and stops without
/// geometry.
///
/// # Errors
///
/// Returns [`IngestError::MalformedRecord`] for a feature whose geometry
/// is not a point.
pub fn load_stops(
    layer: &StopLayer,
    stats: &mut IngestStats,
) -> Result<Vec<StopRecord>, IngestError> {
    let path = layer.path.as_path();
    let source = read_layer(path)?;
    let reprojector = layer_reprojector(path, source.declared_crs, layer.crs)?;

    let mut stops = Vec::with_capacity(source.features.len());

    for (i, feature) in source.features.into_iter().enumerate() {
        let row = i + 1;
        stats.stop_features += 1;

        if feature
            .property(&layer.withdrawn_property)
            .is_some_and(|flag| is_truthy(&flag))
        {
            stats.stops_withdrawn += 1;
            continue;
        }

        let Some(geometry) = feature.geometry else {
            stats.stops_missing_geometry += 1;
            continue;
        };
        let point = match geometry {
            geo::Geometry::Point(point) => point,
            other => {
                return Err(IngestError::MalformedRecord {
                    file: path.to_path_buf(),
                    row,
                    message: format!("stop is a {}, expected a point", geometry_kind(&other)),
                });
            }
        };

        let (longitude, latitude) = match &reprojector {
            Some(reprojector) => reprojector.point(point.x(), point.y())?,
            None => (point.x(), point.y()),
        };

        stops.push(StopRecord {
            id: feature.id,
            longitude,
            latitude,
        });
    }

    log::info!(
        "Loaded {} stops from {} ({} withdrawn, {} without geometry)",
        stops.len(),
        path.display(),
        stats.stops_withdrawn,
        stats.stops_missing_geometry
    );

    Ok(stops)
}

fn read_geojson(path: &Path) -> Result<Layer, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let geojson: GeoJson = text.parse().map_err(|source| IngestError::GeoJson {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(IngestError::MalformedRecord {
            file: path.to_path_buf(),
            row: 0,
            message: "expected a FeatureCollection".to_string(),
        });
    };

    let declared_crs = declared_crs(path, &collection);
    let features = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, mut feature)| {
            let id = feature.id.as_ref().map(id_to_string);
            let properties = Properties::Json(feature.properties.take().unwrap_or_default());
            let geometry = feature_geometry(path, i + 1, feature)?;
            Ok(LayerFeature {
                id,
                properties,
                geometry,
            })
        })
        .collect::<Result<_, IngestError>>()?;

    Ok(Layer {
        features,
        declared_crs,
    })
}

/// The CRS a collection declares in its top-level `crs` member, if any.
///
/// Accepts both `{"type": "name", "properties": {"name": "..."}}` and
/// `{"type": "EPSG", "properties": {"code": 27700}}`.
fn declared_crs(path: &Path, collection: &FeatureCollection) -> Option<Crs> {
    let crs = collection.foreign_members.as_ref()?.get("crs")?;
    let properties = crs.get("properties")?;

    if let Some(code) = properties.get("code").and_then(Value::as_u64) {
        return u32::try_from(code).ok().map(Crs::from_epsg);
    }

    let name = properties.get("name")?.as_str()?;
    let parsed = Crs::parse(name);
    if parsed.is_none() {
        log::warn!(
            "{}: ignoring unrecognized CRS '{name}', assuming WGS84",
            path.display()
        );
    }
    parsed
}

/// A reprojector to WGS84, or `None` if the layer is already in WGS84.
fn layer_reprojector(
    path: &Path,
    declared: Option<Crs>,
    configured: Option<Crs>,
) -> Result<Option<Reprojector>, IngestError> {
    let crs = configured.or(declared).unwrap_or(Crs::WGS84);

    if crs.is_wgs84() {
        return Ok(None);
    }

    log::info!("{}: reprojecting from {crs} to WGS84", path.display());
    Ok(Some(Reprojector::to_wgs84(crs)?))
}

fn feature_geometry(
    path: &Path,
    row: usize,
    feature: Feature,
) -> Result<Option<geo::Geometry<f64>>, IngestError> {
    let Some(geometry) = feature.geometry else {
        return Ok(None);
    };

    geometry
        .try_into()
        .map(Some)
        .map_err(|e: geojson::Error| IngestError::MalformedRecord {
            file: path.to_path_buf(),
            row,
            message: format!("invalid geometry: {e}"),
        })
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Whether a withdrawal flag value means "withdrawn".
///
/// `true`, any non-zero number, and the strings `Y`, `YES`, `T`, `TRUE`
/// and `1` (any case) are truthy. Everything else, including `null`, is
/// not.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_uppercase().as_str(),
            "Y" | "YES" | "T" | "TRUE" | "1"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn property_to_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|v: &f64| v.is_finite())
}

fn property_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_to_string(id: &Id) -> String {
    match id {
        Id::String(s) => s.clone(),
        Id::Number(n) => n.to_string(),
    }
}
