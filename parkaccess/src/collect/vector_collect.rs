use gdal::errors::GdalError;
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess};
use gdal::Dataset;
use geo::Geometry;
use geojson::{JsonObject, JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::geo_core::Crs;
use crate::geometric::layer::{Feature, LayerKind, ParkLayers, VectorLayer};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no input path configured for layer `{0}`")]
    MissingPath(LayerKind),

    #[error("input file for layer `{layer}` not found: {}", .path.display())]
    NotFound { layer: String, path: PathBuf },

    #[error("failed to open vector file {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: GdalError,
    },

    #[error("vector file {} contains no layer", .path.display())]
    NoLayer {
        path: PathBuf,
        #[source]
        source: GdalError,
    },

    #[error("failed to export geometry of feature {index} in {}", .path.display())]
    Wkt {
        path: PathBuf,
        index: usize,
        #[source]
        source: GdalError,
    },

    #[error("failed to convert geometry of feature {index} in {}", .path.display())]
    Convert {
        path: PathBuf,
        index: usize,
        #[source]
        source: geos::Error,
    },
}

/// Reads the park's vector layers from disk with GDAL
pub struct VectorCollect {
    paths: BTreeMap<LayerKind, PathBuf>,
}

impl VectorCollect {
    pub fn new(paths: BTreeMap<LayerKind, PathBuf>) -> Self {
        VectorCollect { paths }
    }

    /// Input paths resolved from the configuration
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let paths = LayerKind::ALL
            .into_iter()
            .map(|kind| (kind, config.layer_path(kind)))
            .collect();
        VectorCollect::new(paths)
    }

    pub fn get_path(&self, kind: LayerKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    /// Load all five layers. The first missing or unreadable file aborts.
    pub fn execute(&self) -> Result<ParkLayers, LoadError> {
        let load = |kind: LayerKind| -> Result<VectorLayer, LoadError> {
            let path = self.paths.get(&kind).ok_or(LoadError::MissingPath(kind))?;
            Self::read_layer(kind.name(), path)
        };

        Ok(ParkLayers {
            boundary: load(LayerKind::Boundary)?,
            lakes: load(LayerKind::Lakes)?,
            roads: load(LayerKind::Roads)?,
            trails: load(LayerKind::Trails)?,
            buffer_zone: load(LayerKind::BufferZone)?,
        })
    }

    /// Read the first layer of any GDAL vector dataset
    pub fn read_layer(name: &str, path: &Path) -> Result<VectorLayer, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound {
                layer: name.to_string(),
                path: path.to_path_buf(),
            });
        }

        let dataset = Dataset::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut layer = dataset.layer(0).map_err(|source| LoadError::NoLayer {
            path: path.to_path_buf(),
            source,
        })?;

        let crs = layer.spatial_ref().and_then(|srs| crs_from_spatial_ref(&srs));
        let mut vector_layer = VectorLayer::new(name, crs);

        for (index, feature) in layer.features().enumerate() {
            let Some(gdal_geometry) = feature.geometry() else {
                warn!(layer = name, index, "feature without geometry skipped");
                continue;
            };

            // Same route as the rest of the GEOS stack: GDAL -> WKT -> GEOS -> geo
            let wkt = gdal_geometry.wkt().map_err(|source| LoadError::Wkt {
                path: path.to_path_buf(),
                index,
                source,
            })?;
            let geometry: Geometry<f64> = geos::Geometry::new_from_wkt(&wkt)
                .and_then(|g| g.try_into())
                .map_err(|source| LoadError::Convert {
                    path: path.to_path_buf(),
                    index,
                    source,
                })?;

            let mut properties = JsonObject::new();
            for (field, value) in feature.fields() {
                properties.insert(field, value.map_or(JsonValue::Null, field_to_json));
            }

            vector_layer.push(Feature::with_properties(geometry, properties));
        }

        match &vector_layer.crs {
            Some(crs) => info!(layer = name, features = vector_layer.len(), %crs, "layer loaded"),
            None => warn!(layer = name, features = vector_layer.len(), "layer loaded without CRS"),
        }
        debug!(layer = name, path = %path.display(), "source");

        Ok(vector_layer)
    }
}

/// EPSG code when GDAL can identify one, the WKT definition otherwise
fn crs_from_spatial_ref(srs: &SpatialRef) -> Option<Crs> {
    let mut srs = srs.clone();
    // .prj files written by ESRI tools often lack an authority node
    let _ = srs.auto_identify_epsg();

    match (srs.auth_name(), srs.auth_code()) {
        (Some(name), Ok(code)) if name.eq_ignore_ascii_case("EPSG") && code > 0 => Some(Crs::Epsg(code as u32)),
        _ => srs.to_wkt().ok().filter(|wkt| !wkt.is_empty()).map(Crs::Definition),
    }
}

fn field_to_json(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::IntegerValue(v) => JsonValue::from(v),
        FieldValue::Integer64Value(v) => JsonValue::from(v),
        FieldValue::RealValue(v) => JsonValue::from(v),
        FieldValue::StringValue(v) => JsonValue::from(v),
        FieldValue::IntegerListValue(v) => JsonValue::from(v),
        FieldValue::Integer64ListValue(v) => JsonValue::from(v),
        FieldValue::RealListValue(v) => JsonValue::from(v),
        FieldValue::StringListValue(v) => JsonValue::from(v),
        FieldValue::DateValue(v) => JsonValue::from(v.to_string()),
        FieldValue::DateTimeValue(v) => JsonValue::from(v.to_rfc3339()),
        other => other.into_string().map_or(JsonValue::Null, JsonValue::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const LAKES_UTM: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32644" } },
        "features": [
            { "type": "Feature", "properties": { "name": "Lami Tal", "area_ha": 12.5 },
              "geometry": { "type": "Polygon", "coordinates": [[[0,0],[100,0],[100,100],[0,100],[0,0]]] } },
            { "type": "Feature", "properties": { "name": "Devi Tal", "area_ha": 3 },
              "geometry": null }
        ]
    }"#;

    const ROADS_WGS84: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": { "highway": "primary" },
              "geometry": { "type": "LineString", "coordinates": [[84.30, 27.55], [84.45, 27.60]] } }
        ]
    }"#;

    #[test]
    fn test_read_layer_with_crs_and_attributes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lakes.geojson");
        fs::write(&path, LAKES_UTM).unwrap();

        let layer = VectorCollect::read_layer("lakes", &path).unwrap();
        assert_eq!(layer.name, "lakes");
        assert_eq!(layer.crs, Some(Crs::Epsg(32644)));
        // the feature without geometry is skipped
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.features[0].property("name").unwrap(), "Lami Tal");
        assert!(matches!(layer.features[0].geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn test_date_fields_become_iso_strings() {
        let date = chrono::NaiveDate::from_ymd_opt(2021, 3, 15).unwrap();
        assert_eq!(field_to_json(FieldValue::DateValue(date)), "2021-03-15");

        let surveyed = chrono::DateTime::parse_from_rfc3339("2021-03-15T10:30:00+05:45").unwrap();
        assert_eq!(field_to_json(FieldValue::DateTimeValue(surveyed)), "2021-03-15T10:30:00+05:45");
    }

    #[test]
    fn test_date_property_is_not_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lakes.geojson");
        fs::write(
            &path,
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "properties": { "surveyed": "2021-03-15" },
                  "geometry": { "type": "Point", "coordinates": [84.4, 27.6] } } ] }"#,
        )
        .unwrap();

        let layer = VectorCollect::read_layer("lakes", &path).unwrap();
        assert_eq!(layer.features[0].property("surveyed").unwrap(), "2021-03-15");
    }

    #[test]
    fn test_geojson_defaults_to_wgs84() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roads.geojson");
        fs::write(&path, ROADS_WGS84).unwrap();

        let layer = VectorCollect::read_layer("roads", &path).unwrap();
        assert!(layer.crs.is_some());
        assert_eq!(layer.features[0].property("highway").unwrap(), "primary");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = VectorCollect::read_layer("trails", &dir.path().join("Trail.shp")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound { ref layer, .. } if layer == "trails"));
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("boundary.shp");
        fs::write(&path, b"not a shapefile").unwrap();

        let err = VectorCollect::read_layer("boundary", &path).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. } | LoadError::NoLayer { .. }));
    }

    #[test]
    fn test_execute_requires_every_layer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roads.geojson");
        fs::write(&path, ROADS_WGS84).unwrap();

        let mut paths = BTreeMap::new();
        paths.insert(LayerKind::Roads, path);
        let err = VectorCollect::new(paths).execute().unwrap_err();
        assert!(matches!(err, LoadError::MissingPath(LayerKind::Boundary)));
    }
}
