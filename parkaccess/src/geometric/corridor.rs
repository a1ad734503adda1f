use geo::{Area, Geometry, Intersects, MultiPolygon, Polygon};
use geojson::JsonObject;
use geos::Geom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::collect::global_variables::BUFFER_DISTANCE;
use crate::commons::basic_functions::{explode, from_geos, is_polygonal, to_geos, EnvelopeIndex};
use crate::geometric::layer::{Feature, VectorLayer};

/// GEOS default number of segments per quarter circle
pub const DEFAULT_QUADRANT_SEGMENTS: i32 = 16;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("GEOS failed while {operation} feature {index} of `{layer}`")]
    Geos {
        operation: &'static str,
        layer: String,
        index: usize,
        #[source]
        source: geos::Error,
    },
}

impl OverlayError {
    fn geos<'a>(operation: &'static str, layer: &'a str, index: usize) -> impl FnOnce(geos::Error) -> OverlayError + 'a {
        move |source| OverlayError::Geos {
            operation,
            layer: layer.to_string(),
            index,
            source,
        }
    }
}

/// What to do with line/point pieces left over by the union overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    Keep,
    /// Leftovers lie on the boundary of a polygonal piece, dropping them does
    /// not change which lakes intersect the combined buffer
    #[default]
    Drop,
}

/// Union overlay of the road and trail buffers
#[derive(Debug, Clone)]
pub struct CombinedBuffer {
    layer: VectorLayer,
    dropped: usize,
}

impl CombinedBuffer {
    /// Overlay pieces, intersections first
    pub fn layer(&self) -> &VectorLayer {
        &self.layer
    }

    pub fn into_layer(self) -> VectorLayer {
        self.layer
    }

    pub fn len(&self) -> usize {
        self.layer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layer.is_empty()
    }

    /// Degenerate pieces removed under [`DegeneratePolicy::Drop`]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// All pieces merged into one geometry
    pub fn dissolved(&self) -> Result<Option<Geometry<f64>>, OverlayError> {
        let name = self.layer.name.as_str();
        let pieces = self
            .layer
            .geometries()
            .enumerate()
            .map(|(index, g)| to_geos(g).map_err(OverlayError::geos("dissolving", name, index)))
            .collect::<Result<Vec<_>, _>>()?;

        let merged = geos::Geometry::create_geometry_collection(pieces)
            .and_then(|gc| gc.unary_union())
            .map_err(OverlayError::geos("dissolving", name, 0))?;
        from_geos(merged).map_err(OverlayError::geos("dissolving", name, 0))
    }

    /// Area covered by the combined buffer, overlaps counted once
    pub fn covered_area(&self) -> Result<f64, OverlayError> {
        Ok(self.dissolved()?.map_or(0.0, |g| g.unsigned_area()))
    }
}

/// Buffer builder for the access corridors along roads and trails
pub struct Corridor {
    /// Buffer radius in target CRS units
    distance: f64,
    quadrant_segments: i32,
    degenerate_policy: DegeneratePolicy,
    road_buffers: Option<VectorLayer>,
    trail_buffers: Option<VectorLayer>,
    combined: Option<CombinedBuffer>,
}

impl Default for Corridor {
    fn default() -> Self {
        Corridor::new(BUFFER_DISTANCE)
    }
}

impl Corridor {
    pub fn new(distance: f64) -> Self {
        Corridor {
            distance,
            quadrant_segments: DEFAULT_QUADRANT_SEGMENTS,
            degenerate_policy: DegeneratePolicy::default(),
            road_buffers: None,
            trail_buffers: None,
            combined: None,
        }
    }

    /// Segments used to approximate a quarter circle, at least 1
    pub fn set_quadrant_segments(&mut self, segments: i32) {
        self.quadrant_segments = segments.max(1);
    }

    /// Get quadrant segments
    pub fn get_quadrant_segments(&self) -> i32 {
        self.quadrant_segments
    }

    /// Set how degenerate overlay pieces are handled
    pub fn set_degenerate_policy(&mut self, policy: DegeneratePolicy) {
        self.degenerate_policy = policy;
    }

    /// Get buffer radius
    pub fn get_distance(&self) -> f64 {
        self.distance
    }

    /// Buffer roads and trails, then overlay both buffer sets
    pub fn run(mut self, roads: &VectorLayer, trails: &VectorLayer) -> Result<Self, OverlayError> {
        self.run_internal(roads, trails)?;
        Ok(self)
    }

    pub fn run_internal(&mut self, roads: &VectorLayer, trails: &VectorLayer) -> Result<(), OverlayError> {
        let road_buffers = self.buffer_layer(roads)?;
        let trail_buffers = self.buffer_layer(trails)?;

        let combined = overlay_union(&road_buffers, &trail_buffers, self.degenerate_policy)?;
        info!(
            distance = self.distance,
            roads = road_buffers.len(),
            trails = trail_buffers.len(),
            pieces = combined.len(),
            "combined buffer built"
        );

        self.road_buffers = Some(road_buffers);
        self.trail_buffers = Some(trail_buffers);
        self.combined = Some(combined);
        Ok(())
    }

    /// Replace every geometry by its buffer. Feature count and attributes are
    /// preserved; a geometry whose buffer is empty gets an empty multipolygon.
    pub fn buffer_layer(&self, layer: &VectorLayer) -> Result<VectorLayer, OverlayError> {
        let mut features = Vec::with_capacity(layer.len());

        for (index, feature) in layer.iter().enumerate() {
            let buffered = to_geos(&feature.geometry)
                .and_then(|g| g.buffer(self.distance, self.quadrant_segments))
                .map_err(OverlayError::geos("buffering", &layer.name, index))?;
            let geometry = from_geos(buffered)
                .map_err(OverlayError::geos("buffering", &layer.name, index))?
                .unwrap_or_else(|| Geometry::MultiPolygon(MultiPolygon(Vec::new())));

            features.push(Feature::with_properties(geometry, feature.properties.clone()));
        }

        Ok(VectorLayer::with_features(
            format!("{}_buffer", layer.name),
            layer.crs.clone(),
            features,
        ))
    }

    /// Get buffered roads (None before `run`)
    pub fn get_road_buffers(&self) -> Option<&VectorLayer> {
        self.road_buffers.as_ref()
    }

    /// Get buffered trails (None before `run`)
    pub fn get_trail_buffers(&self) -> Option<&VectorLayer> {
        self.trail_buffers.as_ref()
    }

    /// Get the union overlay of both buffer sets (None before `run`)
    pub fn get_combined(&self) -> Option<&CombinedBuffer> {
        self.combined.as_ref()
    }

    /// Take the combined buffer out of the builder
    pub fn into_combined(self) -> Option<CombinedBuffer> {
        self.combined
    }
}

/// Column names present on both sides get a `_1` / `_2` suffix
fn shared_columns(left: &VectorLayer, right: &VectorLayer) -> BTreeSet<String> {
    let keys = |layer: &VectorLayer| -> BTreeSet<String> {
        layer.iter().flat_map(|f| f.properties.keys().cloned()).collect()
    };
    keys(left).intersection(&keys(right)).cloned().collect()
}

fn suffixed(properties: &JsonObject, shared: &BTreeSet<String>, suffix: &str, out: &mut JsonObject) {
    for (key, value) in properties {
        let key = if shared.contains(key) {
            format!("{}{}", key, suffix)
        } else {
            key.clone()
        };
        out.insert(key, value.clone());
    }
}

/// Union overlay of two polygon layers.
///
/// The output holds, in this order: the intersection of every overlapping
/// (left, right) pair with attributes of both, the part of each left feature
/// not covered by the right layer, and the part of each right feature not
/// covered by the left layer. Pieces of any geometry type are accepted;
/// lower-dimensional ones are kept or dropped according to `policy`.
pub fn overlay_union(
    left: &VectorLayer,
    right: &VectorLayer,
    policy: DegeneratePolicy,
) -> Result<CombinedBuffer, OverlayError> {
    let shared = shared_columns(left, right);
    let crs = left.crs.clone().or_else(|| right.crs.clone());

    let convert = |layer: &VectorLayer| -> Result<Vec<geos::Geometry>, OverlayError> {
        layer
            .iter()
            .enumerate()
            .map(|(index, f)| to_geos(&f.geometry).map_err(OverlayError::geos("converting", &layer.name, index)))
            .collect()
    };
    let left_geos = convert(left)?;
    let right_geos = convert(right)?;

    let right_index = EnvelopeIndex::new(right.geometries());

    let mut pieces = PieceCollector::new(policy);
    let mut left_overlaps: Vec<Vec<usize>> = vec![Vec::new(); left.len()];
    let mut right_overlaps: Vec<Vec<usize>> = vec![Vec::new(); right.len()];

    for (i, left_feature) in left.iter().enumerate() {
        for j in right_index.candidates(&left_feature.geometry) {
            if !left_feature.geometry.intersects(&right.features[j].geometry) {
                continue;
            }
            left_overlaps[i].push(j);
            right_overlaps[j].push(i);

            let piece = left_geos[i]
                .intersection(&right_geos[j])
                .map_err(OverlayError::geos("intersecting", &left.name, i))?;

            let mut properties = JsonObject::new();
            suffixed(&left_feature.properties, &shared, "_1", &mut properties);
            suffixed(&right.features[j].properties, &shared, "_2", &mut properties);
            pieces.push(piece, properties, &left.name, i)?;
        }
    }

    for (i, left_feature) in left.iter().enumerate() {
        let rest = difference_all(&left_geos[i], left_overlaps[i].iter().map(|&j| &right_geos[j]))
            .map_err(OverlayError::geos("differencing", &left.name, i))?;
        let mut properties = JsonObject::new();
        suffixed(&left_feature.properties, &shared, "_1", &mut properties);
        pieces.push(rest, properties, &left.name, i)?;
    }

    for (j, right_feature) in right.iter().enumerate() {
        let rest = difference_all(&right_geos[j], right_overlaps[j].iter().map(|&i| &left_geos[i]))
            .map_err(OverlayError::geos("differencing", &right.name, j))?;
        let mut properties = JsonObject::new();
        suffixed(&right_feature.properties, &shared, "_2", &mut properties);
        pieces.push(rest, properties, &right.name, j)?;
    }

    let (features, dropped) = pieces.finish();
    if dropped > 0 {
        debug!(dropped, "degenerate overlay pieces dropped");
    }

    Ok(CombinedBuffer {
        layer: VectorLayer::with_features("combined_buffer", crs, features),
        dropped,
    })
}

fn difference_all<'a>(
    geometry: &geos::Geometry,
    others: impl Iterator<Item = &'a geos::Geometry>,
) -> Result<geos::Geometry, geos::Error> {
    let mut rest = Clone::clone(geometry);
    for other in others {
        rest = rest.difference(other)?;
    }
    Ok(rest)
}

struct PieceCollector {
    policy: DegeneratePolicy,
    features: Vec<Feature>,
    dropped: usize,
}

impl PieceCollector {
    fn new(policy: DegeneratePolicy) -> Self {
        PieceCollector {
            policy,
            features: Vec::new(),
            dropped: 0,
        }
    }

    fn push(&mut self, piece: geos::Geometry, properties: JsonObject, layer: &str, index: usize) -> Result<(), OverlayError> {
        let Some(geometry) = from_geos(piece).map_err(OverlayError::geos("converting", layer, index))? else {
            return Ok(());
        };

        let keep = match self.policy {
            DegeneratePolicy::Keep => Some(geometry),
            DegeneratePolicy::Drop => polygonal_part(geometry),
        };

        match keep {
            Some(geometry) => self.features.push(Feature::with_properties(geometry, properties)),
            None => self.dropped += 1,
        }
        Ok(())
    }

    fn finish(self) -> (Vec<Feature>, usize) {
        (self.features, self.dropped)
    }
}

/// Polygons of a piece without its line and point parts. Polygonal input is
/// returned as is; mixed collections become a (Multi)Polygon.
fn polygonal_part(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    if is_polygonal(&geometry) {
        return Some(geometry);
    }

    let mut polygons: Vec<Polygon<f64>> = explode(geometry)
        .into_iter()
        .filter_map(|g| match g {
            Geometry::Polygon(p) => Some(p),
            Geometry::Rect(r) => Some(r.to_polygon()),
            Geometry::Triangle(t) => Some(t.to_polygon()),
            _ => None,
        })
        .collect();

    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon(polygons))),
    }
}
