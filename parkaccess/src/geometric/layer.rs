use anyhow::{Context, Result};
use geo::{BoundingRect, Geometry, Rect};
use geojson::{FeatureCollection, JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::geo_core::{BoundingBox, Crs};

/// The five layers the park analysis works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Boundary,
    Lakes,
    Roads,
    Trails,
    /// Buffer zone polygon around the park (not the road/trail buffers)
    BufferZone,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Boundary,
        LayerKind::Lakes,
        LayerKind::Roads,
        LayerKind::Trails,
        LayerKind::BufferZone,
    ];

    /// Short name used for logging and as the layer name
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Boundary => "boundary",
            LayerKind::Lakes => "lakes",
            LayerKind::Roads => "roads",
            LayerKind::Trails => "trails",
            LayerKind::BufferZone => "buffer",
        }
    }

    /// Label shown in map legends
    pub fn label(&self) -> &'static str {
        match self {
            LayerKind::Boundary => "Park Boundary",
            LayerKind::Lakes => "Lakes",
            LayerKind::Roads => "Roads",
            LayerKind::Trails => "Trails",
            LayerKind::BufferZone => "Buffer Zone",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single vector feature: geometry plus attribute fields
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: JsonObject,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Feature {
            geometry: geometry.into(),
            properties: JsonObject::new(),
        }
    }

    pub fn with_properties(geometry: impl Into<Geometry<f64>>, properties: JsonObject) -> Self {
        Feature {
            geometry: geometry.into(),
            properties,
        }
    }

    pub fn property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Convert to a GeoJSON feature, coordinates are written as-is
    pub fn to_geojson(&self) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

/// A named collection of features sharing one coordinate reference system
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub name: String,
    pub features: Vec<Feature>,
    /// `None` when the source file carried no CRS definition
    pub crs: Option<Crs>,
}

impl VectorLayer {
    pub fn new(name: impl Into<String>, crs: Option<Crs>) -> Self {
        VectorLayer {
            name: name.into(),
            features: Vec::new(),
            crs,
        }
    }

    pub fn with_features(name: impl Into<String>, crs: Option<Crs>, features: Vec<Feature>) -> Self {
        VectorLayer {
            name: name.into(),
            features,
            crs,
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().map(|f| &f.geometry)
    }

    /// Joint extent of all geometries, `None` for an empty layer
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometries()
            .filter_map(|g| g.bounding_rect())
            .map(BoundingBox::from_rect)
            .reduce(|a, b| a.union(&b))
            .map(|bbox| bbox.to_rect())
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.iter().map(Feature::to_geojson).collect(),
            foreign_members: None,
        }
    }

    /// Save the layer as `<output_dir>/<name>.geojson`
    pub fn to_geojson(&self, output_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        let name = name.unwrap_or(&self.name);
        let output_file = output_dir.join(format!("{}.geojson", name));

        let geojson_str = serde_json::to_string(&self.to_feature_collection())
            .context("Failed to serialize layer to GeoJSON")?;
        std::fs::write(&output_file, geojson_str)
            .with_context(|| format!("Failed to write GeoJSON file: {}", output_file.display()))?;

        info!(layer = %self.name, path = %output_file.display(), "layer saved");
        Ok(output_file)
    }
}

impl<'a> IntoIterator for &'a VectorLayer {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

/// The five input layers of the analysis
#[derive(Debug, Clone)]
pub struct ParkLayers {
    pub boundary: VectorLayer,
    pub lakes: VectorLayer,
    pub roads: VectorLayer,
    pub trails: VectorLayer,
    pub buffer_zone: VectorLayer,
}

impl ParkLayers {
    pub fn get(&self, kind: LayerKind) -> &VectorLayer {
        match kind {
            LayerKind::Boundary => &self.boundary,
            LayerKind::Lakes => &self.lakes,
            LayerKind::Roads => &self.roads,
            LayerKind::Trails => &self.trails,
            LayerKind::BufferZone => &self.buffer_zone,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerKind, &VectorLayer)> {
        LayerKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Build a new set by applying `f` to every layer, stopping at the first error
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(LayerKind, &VectorLayer) -> Result<VectorLayer, E>,
    ) -> Result<ParkLayers, E> {
        Ok(ParkLayers {
            boundary: f(LayerKind::Boundary, &self.boundary)?,
            lakes: f(LayerKind::Lakes, &self.lakes)?,
            roads: f(LayerKind::Roads, &self.roads)?,
            trails: f(LayerKind::Trails, &self.trails)?,
            buffer_zone: f(LayerKind::BufferZone, &self.buffer_zone)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    fn square(x: f64, y: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    #[test]
    fn test_layer_bounding_rect_spans_all_features() {
        let mut layer = VectorLayer::new("lakes", Some(Crs::Epsg(32644)));
        layer.push(Feature::new(square(0.0, 0.0, 10.0)));
        layer.push(Feature::new(point!(x: 50.0, y: -5.0)));

        let rect = layer.bounding_rect().unwrap();
        assert_eq!(rect.min().x, 0.0);
        assert_eq!(rect.min().y, -5.0);
        assert_eq!(rect.max().x, 50.0);
        assert_eq!(rect.max().y, 10.0);
    }

    #[test]
    fn test_empty_layer_has_no_extent() {
        let layer = VectorLayer::new("roads", None);
        assert!(layer.is_empty());
        assert!(layer.bounding_rect().is_none());
    }

    #[test]
    fn test_feature_collection_keeps_properties() {
        let mut feature = Feature::new(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        feature.set_property("name", "Mahendra Highway");
        let layer = VectorLayer::with_features("roads", None, vec![feature]);

        let fc = layer.to_feature_collection();
        assert_eq!(fc.features.len(), 1);
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["name"], "Mahendra Highway");
    }

    #[test]
    fn test_park_layers_iterate_in_fixed_order() {
        let layer = |kind: LayerKind| VectorLayer::new(kind.name(), None);
        let layers = ParkLayers {
            boundary: layer(LayerKind::Boundary),
            lakes: layer(LayerKind::Lakes),
            roads: layer(LayerKind::Roads),
            trails: layer(LayerKind::Trails),
            buffer_zone: layer(LayerKind::BufferZone),
        };

        let names: Vec<_> = layers.iter().map(|(_, l)| l.name.as_str()).collect();
        assert_eq!(names, ["boundary", "lakes", "roads", "trails", "buffer"]);
    }

    #[test]
    fn test_layer_kind_deserializes_snake_case() {
        let kind: LayerKind = serde_yaml::from_str("buffer_zone").unwrap();
        assert_eq!(kind, LayerKind::BufferZone);
    }
}
