use geo::{Coord, MapCoords, Point, Polygon, Rect};
use proj::Proj;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::collect::global_variables::TARGET_EPSG;
use crate::geometric::layer::{Feature, LayerKind, ParkLayers, VectorLayer};

/// Geographic WGS84, the CRS web maps expect
pub const WGS84_EPSG: u32 = 4326;

/// Coordinate reference system of a layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Crs {
    /// Identified by an EPSG code
    Epsg(u32),
    /// Any other definition PROJ understands (WKT, PROJ string)
    Definition(String),
}

impl Crs {
    pub fn epsg_code(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Definition(_) => None,
        }
    }

    /// String handed to PROJ when building a transformation
    pub fn to_proj_string(&self) -> String {
        match self {
            Crs::Epsg(code) => format!("EPSG:{}", code),
            Crs::Definition(definition) => definition.clone(),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Definition(definition) => {
                // WKT definitions are long, the head is enough to tell them apart in logs
                let head: String = definition.chars().take(60).collect();
                if head.len() < definition.len() {
                    write!(f, "{}...", head)
                } else {
                    f.write_str(&head)
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ReprojectError {
    #[error("layer `{layer}` has no coordinate reference system, supply a source CRS override")]
    UndefinedCrs { layer: String },

    #[error("failed to create transformation from {from} to {to}")]
    Create {
        from: Crs,
        to: Crs,
        #[source]
        source: proj::ProjCreateError,
    },

    #[error("failed to transform layer `{layer}` into {to}")]
    Transform {
        layer: String,
        to: Crs,
        #[source]
        source: proj::ProjError,
    },

    #[error("CRS mismatch after reprojection! Found: {}", .found.join(", "))]
    CrsMismatch { found: Vec<String> },
}

/// CRS handling for the analysis: the target CRS every layer is brought into,
/// plus optional per-layer source CRS overrides
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// Target CRS
    pub target: Crs,
    /// Used instead of the CRS read from file
    pub source_overrides: BTreeMap<LayerKind, Crs>,
}

impl Default for GeoCore {
    fn default() -> Self {
        GeoCore::new(TARGET_EPSG)
    }
}

impl GeoCore {
    pub fn new(epsg: u32) -> Self {
        GeoCore {
            target: Crs::Epsg(epsg),
            source_overrides: BTreeMap::new(),
        }
    }

    pub fn get_epsg(&self) -> Option<u32> {
        self.target.epsg_code()
    }

    pub fn set_epsg(&mut self, epsg: u32) {
        self.target = Crs::Epsg(epsg);
    }

    pub fn set_source_override(&mut self, kind: LayerKind, crs: Crs) {
        self.source_overrides.insert(kind, crs);
    }

    /// Source CRS of a layer: the override when one is set, else what the file declared
    pub fn source_crs(&self, kind: Option<LayerKind>, layer: &VectorLayer) -> Result<Crs, ReprojectError> {
        kind.and_then(|k| self.source_overrides.get(&k))
            .or(layer.crs.as_ref())
            .cloned()
            .ok_or_else(|| ReprojectError::UndefinedCrs {
                layer: layer.name.clone(),
            })
    }

    /// Transform every coordinate of `layer` into the target CRS.
    /// Feature count, order and attributes are preserved.
    pub fn reproject_layer(&self, kind: Option<LayerKind>, layer: &VectorLayer) -> Result<VectorLayer, ReprojectError> {
        let from = self.source_crs(kind, layer)?;
        reproject(layer, &from, &self.target)
    }

    /// Reproject all five layers and verify they ended up in a single CRS,
    /// which is returned alongside them
    pub fn reproject_all(&self, layers: &ParkLayers) -> Result<(ParkLayers, Crs), ReprojectError> {
        let reprojected = layers.try_map(|kind, layer| self.reproject_layer(Some(kind), layer))?;
        let crs = ensure_single_crs(reprojected.iter().map(|(_, layer)| layer))?;
        Ok((reprojected, crs))
    }

    /// Transform coordinates from one CRS to another
    pub fn transform_coords(from: &Crs, to: &Crs, x: f64, y: f64) -> Result<(f64, f64), ReprojectError> {
        let proj = create_proj(from, to)?;

        proj.convert((x, y)).map_err(|source| ReprojectError::Transform {
            layer: "<coordinate>".to_string(),
            to: to.clone(),
            source,
        })
    }

    /// Transform a Point from one CRS to another
    pub fn transform_point(from: &Crs, to: &Crs, point: Point<f64>) -> Result<Point<f64>, ReprojectError> {
        let (x, y) = Self::transform_coords(from, to, point.x(), point.y())?;
        Ok(Point::new(x, y))
    }
}

fn create_proj(from: &Crs, to: &Crs) -> Result<Proj, ReprojectError> {
    Proj::new_known_crs(&from.to_proj_string(), &to.to_proj_string(), None).map_err(|source| {
        ReprojectError::Create {
            from: from.clone(),
            to: to.clone(),
            source,
        }
    })
}

/// Reproject a layer from an explicit source CRS. A layer already in `to` is
/// copied unchanged.
pub fn reproject(layer: &VectorLayer, from: &Crs, to: &Crs) -> Result<VectorLayer, ReprojectError> {
    if from == to {
        return Ok(VectorLayer {
            crs: Some(to.clone()),
            ..layer.clone()
        });
    }

    let proj = create_proj(from, to)?;
    debug!(layer = %layer.name, %from, %to, "reprojecting");

    let mut features = Vec::with_capacity(layer.len());
    for feature in layer {
        let geometry = feature
            .geometry
            .try_map_coords(|c: Coord<f64>| proj.convert((c.x, c.y)).map(|(x, y)| Coord { x, y }))
            .map_err(|source| ReprojectError::Transform {
                layer: layer.name.clone(),
                to: to.clone(),
                source,
            })?;
        features.push(Feature::with_properties(geometry, feature.properties.clone()));
    }

    Ok(VectorLayer::with_features(layer.name.clone(), Some(to.clone()), features))
}

/// Reproject a layer that already carries a CRS
pub fn reproject_to(layer: &VectorLayer, to: &Crs) -> Result<VectorLayer, ReprojectError> {
    let from = layer.crs.clone().ok_or_else(|| ReprojectError::UndefinedCrs {
        layer: layer.name.clone(),
    })?;
    reproject(layer, &from, to)
}

/// The set of CRS values across `layers` must have exactly one member.
/// Returns that CRS, or the distinct values found.
pub fn ensure_single_crs<'a>(layers: impl IntoIterator<Item = &'a VectorLayer>) -> Result<Crs, ReprojectError> {
    let crs_set: BTreeSet<Option<&Crs>> = layers.into_iter().map(|layer| layer.crs.as_ref()).collect();

    let mut iter = crs_set.iter();
    match (iter.next(), iter.next()) {
        (Some(Some(crs)), None) => Ok((*crs).clone()),
        _ => Err(ReprojectError::CrsMismatch {
            found: crs_set
                .iter()
                .map(|crs| crs.map_or_else(|| "undefined".to_string(), |c| c.to_string()))
                .collect(),
        }),
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.max_x, y: self.max_y },
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grow by `ratio` of the larger side on every edge
    pub fn pad(&self, ratio: f64) -> BoundingBox {
        let margin = self.width().max(self.height()) * ratio;
        BoundingBox::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Widen the shorter side so width / height equals `aspect`, keeping the center
    pub fn fit_aspect(&self, aspect: f64) -> BoundingBox {
        let (cx, cy) = self.center();
        let mut width = self.width().max(f64::EPSILON);
        let mut height = self.height().max(f64::EPSILON);

        if width / height < aspect {
            width = height * aspect;
        } else {
            height = width / aspect;
        }

        BoundingBox::new(cx - width / 2.0, cy - height / 2.0, cx + width / 2.0, cy + height / 2.0)
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    /// Transform bounding box to another CRS
    pub fn transform(&self, from: &Crs, to: &Crs) -> Result<Self, ReprojectError> {
        let (min_x, min_y) = GeoCore::transform_coords(from, to, self.min_x, self.min_y)?;
        let (max_x, max_y) = GeoCore::transform_coords(from, to, self.max_x, self.max_y)?;

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{point, polygon, Contains, Geometry};

    fn layer(name: &str, crs: Option<Crs>) -> VectorLayer {
        VectorLayer::with_features(
            name,
            crs,
            vec![Feature::new(point!(x: 84.4, y: 27.6))],
        )
    }

    fn park_layers(crs: Option<Crs>) -> ParkLayers {
        ParkLayers {
            boundary: layer("boundary", crs.clone()),
            lakes: layer("lakes", crs.clone()),
            roads: layer("roads", crs.clone()),
            trails: layer("trails", crs.clone()),
            buffer_zone: layer("buffer", crs),
        }
    }

    #[test]
    fn test_geo_core_default() {
        let gc = GeoCore::default();
        assert_eq!(gc.get_epsg(), Some(32644));
    }

    #[test]
    fn test_crs_display() {
        assert_eq!(Crs::Epsg(32644).to_string(), "EPSG:32644");
        assert_eq!(Crs::Epsg(4326).to_proj_string(), "EPSG:4326");
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert!(bbox.to_polygon().contains(&point!(x: 0.5, y: 0.5)));
    }

    #[test]
    fn test_fit_aspect_keeps_center_and_extent() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 2.0).fit_aspect(1.5);
        assert_relative_eq!(bbox.width() / bbox.height(), 1.5);
        assert_relative_eq!(bbox.center().0, 5.0);
        assert_relative_eq!(bbox.center().1, 1.0);
        assert!(bbox.width() >= 10.0);
    }

    #[test]
    fn test_single_crs_after_reprojection() {
        let layers = park_layers(Some(Crs::Epsg(WGS84_EPSG)));
        let (reprojected, crs) = GeoCore::default().reproject_all(&layers).unwrap();
        assert_eq!(crs, Crs::Epsg(32644));
        for (_, l) in reprojected.iter() {
            assert_eq!(l.len(), 1);
        }

        // 84.4E is just east of zone 44 (78E..84E), UTM still projects it
        let Geometry::Point(p) = reprojected.lakes.features[0].geometry else {
            panic!("expected a point");
        };
        assert!(p.x().is_finite());
        assert!(p.y() > 3_000_000.0 && p.y() < 3_100_000.0);
    }

    #[test]
    fn test_undefined_crs_is_reported() {
        let mut layers = park_layers(Some(Crs::Epsg(WGS84_EPSG)));
        layers.trails.crs = None;

        let err = GeoCore::default().reproject_all(&layers).unwrap_err();
        assert!(matches!(err, ReprojectError::UndefinedCrs { ref layer } if layer == "trails"));
    }

    #[test]
    fn test_override_fills_undefined_crs() {
        let mut layers = park_layers(Some(Crs::Epsg(WGS84_EPSG)));
        layers.trails.crs = None;

        let mut gc = GeoCore::default();
        gc.set_source_override(LayerKind::Trails, Crs::Epsg(WGS84_EPSG));
        let (reprojected, _) = gc.reproject_all(&layers).unwrap();
        assert_eq!(reprojected.trails.crs, Some(Crs::Epsg(32644)));
    }

    #[test]
    fn test_mismatch_lists_distinct_values() {
        let layers = vec![
            layer("a", Some(Crs::Epsg(32644))),
            layer("b", Some(Crs::Epsg(32644))),
            layer("c", Some(Crs::Epsg(4326))),
        ];

        match ensure_single_crs(&layers) {
            Err(ReprojectError::CrsMismatch { found }) => {
                assert_eq!(found, vec!["EPSG:4326".to_string(), "EPSG:32644".to_string()]);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_same_crs_is_passed_through() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let source = VectorLayer::with_features("lakes", Some(Crs::Epsg(32644)), vec![Feature::new(square)]);

        let out = reproject_to(&source, &Crs::Epsg(32644)).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_transform_roundtrip_point() {
        let wgs84 = Crs::Epsg(WGS84_EPSG);
        let utm = Crs::Epsg(32644);
        let p = GeoCore::transform_point(&wgs84, &utm, Point::new(84.4, 27.6)).unwrap();
        let back = GeoCore::transform_point(&utm, &wgs84, p).unwrap();
        assert_relative_eq!(back.x(), 84.4, epsilon = 1e-6);
        assert_relative_eq!(back.y(), 27.6, epsilon = 1e-6);
    }
}
