//! ESRI shapefile layers: `.shp` geometry, `.dbf` attributes and the
//! optional `.prj` projection.

use std::path::Path;

use crime_spatial_geography_models::Crs;
use serde_json::{Number, Value};
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};

use crate::IngestError;
use crate::layers::{Layer, LayerFeature, Properties};

pub(crate) fn read_shapefile(path: &Path) -> Result<Layer, IngestError> {
    let shapefile_error = |source: shapefile::Error| IngestError::Shapefile {
        path: path.to_path_buf(),
        source: Box::new(source),
    };

    let mut reader = Reader::from_path(path).map_err(shapefile_error)?;
    let mut features = Vec::new();

    for (i, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item.map_err(shapefile_error)?;
        let geometry = shape_geometry(path, i + 1, shape)?;
        features.push(LayerFeature {
            id: None,
            properties: Properties::Dbase(record),
            geometry,
        });
    }

    Ok(Layer {
        features,
        declared_crs: prj_crs(path)?,
    })
}

fn shape_geometry(
    path: &Path,
    row: usize,
    shape: Shape,
) -> Result<Option<geo::Geometry<f64>>, IngestError> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }

    geo::Geometry::try_from(shape)
        .map(Some)
        .map_err(|_| IngestError::MalformedRecord {
            file: path.to_path_buf(),
            row,
            message: "shape cannot be represented as a geometry".to_string(),
        })
}

/// The CRS named by the `.prj` sidecar, if there is one.
fn prj_crs(path: &Path) -> Result<Option<Crs>, IngestError> {
    let prj = path.with_extension("prj");
    if !prj.is_file() {
        return Ok(None);
    }

    let wkt = std::fs::read_to_string(&prj).map_err(|source| IngestError::Io {
        path: prj.clone(),
        source,
    })?;
    let crs = Crs::from_wkt(&wkt);
    if crs.is_none() {
        log::warn!(
            "{}: ignoring unrecognized projection, assuming WGS84",
            prj.display()
        );
    }
    Ok(crs)
}

/// A `.dbf` field as the JSON value a `GeoJSON` property would carry.
pub(crate) fn field_to_value(field: &FieldValue) -> Value {
    let number = |v: f64| Number::from_f64(v).map_or(Value::Null, Value::Number);
    match field {
        FieldValue::Character(text) => text.clone().map_or(Value::Null, Value::String),
        FieldValue::Memo(text) => Value::String(text.clone()),
        FieldValue::Numeric(v) => v.map_or(Value::Null, number),
        FieldValue::Float(v) => v.map_or(Value::Null, |v| number(f64::from(v))),
        FieldValue::Double(v) => number(*v),
        FieldValue::Integer(v) => Value::from(*v),
        FieldValue::Logical(flag) => flag.map_or(Value::Null, Value::Bool),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbase_fields_become_json_values() {
        assert_eq!(
            field_to_value(&FieldValue::Character(Some("H1".to_string()))),
            Value::from("H1")
        );
        assert_eq!(field_to_value(&FieldValue::Character(None)), Value::Null);
        assert_eq!(field_to_value(&FieldValue::Numeric(Some(12.0))), Value::from(12.0));
        assert_eq!(field_to_value(&FieldValue::Numeric(None)), Value::Null);
        assert_eq!(field_to_value(&FieldValue::Integer(7)), Value::from(7));
        assert_eq!(
            field_to_value(&FieldValue::Logical(Some(true))),
            Value::Bool(true)
        );
    }
}
