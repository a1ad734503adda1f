use geo::{BoundingRect, Geometry, Rect};
use geos::Geom;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;

/// Convert a geo geometry into GEOS
pub fn to_geos(geometry: &Geometry<f64>) -> Result<geos::Geometry, geos::Error> {
    geos::Geometry::try_from(geometry)
}

/// Convert a GEOS geometry back into geo. Empty results come back as `None`.
pub fn from_geos(geometry: geos::Geometry) -> Result<Option<Geometry<f64>>, geos::Error> {
    if geometry.is_empty()? {
        return Ok(None);
    }
    let geometry: Geometry<f64> = geometry.try_into()?;
    Ok(Some(geometry))
}

/// Split collections and multi-geometries into their single parts
pub fn explode(geometry: Geometry<f64>) -> Vec<Geometry<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => mp.0.into_iter().map(Geometry::Polygon).collect(),
        Geometry::MultiLineString(ml) => ml.0.into_iter().map(Geometry::LineString).collect(),
        Geometry::MultiPoint(mp) => mp.0.into_iter().map(Geometry::Point).collect(),
        Geometry::GeometryCollection(gc) => gc.0.into_iter().flat_map(explode).collect(),
        other => vec![other],
    }
}

/// True for polygonal geometries (anything with area)
pub fn is_polygonal(geometry: &Geometry<f64>) -> bool {
    matches!(
        geometry,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_)
    )
}

/// Value identity of a geometry. Two geometries share a key only when they
/// have the same type and bit-identical coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryKey(String);

impl GeometryKey {
    pub fn new(geometry: &Geometry<f64>) -> Self {
        // serde_json writes f64 with shortest round-trip formatting, so the text is exact
        let value = geojson::Value::from(geometry);
        GeometryKey(serde_json::to_string(&value).unwrap_or_else(|_| format!("{:?}", geometry)))
    }
}

/// Number of distinct geometry values
pub fn count_unique<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> usize {
    geometries
        .into_iter()
        .map(GeometryKey::new)
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Clone)]
struct IndexedEnvelope {
    idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// R-tree over geometry envelopes, used to find candidate pairs before an
/// exact predicate check
#[derive(Debug, Clone)]
pub struct EnvelopeIndex {
    rtree: RTree<IndexedEnvelope>,
}

impl EnvelopeIndex {
    pub fn new<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> Self {
        let entries = geometries
            .into_iter()
            .enumerate()
            .filter_map(|(idx, g)| g.bounding_rect().map(|bbox| IndexedEnvelope { idx, bbox }))
            .collect();

        EnvelopeIndex {
            rtree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    /// Indices whose envelope intersects the envelope of `geometry`, ascending
    pub fn candidates(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };
        let search = AABB::from_corners(rect.min().into(), rect.max().into());

        let mut found: Vec<usize> = self
            .rtree
            .locate_in_envelope_intersecting(&search)
            .map(|entry| entry.idx)
            .collect();
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, GeometryCollection, MultiPolygon};

    fn unit_square(x: f64, y: f64) -> geo::Polygon<f64> {
        polygon![(x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0)]
    }

    #[test]
    fn test_geometry_key_is_value_based() {
        let a = Geometry::Polygon(unit_square(0.0, 0.0));
        let b = Geometry::Polygon(unit_square(0.0, 0.0));
        let c = Geometry::Polygon(unit_square(0.0, 1e-9));

        assert_eq!(GeometryKey::new(&a), GeometryKey::new(&b));
        assert_ne!(GeometryKey::new(&a), GeometryKey::new(&c));
        assert_eq!(count_unique([&a, &b, &c]), 2);
    }

    #[test]
    fn test_geometry_key_distinguishes_types() {
        let single = Geometry::Polygon(unit_square(0.0, 0.0));
        let multi = Geometry::MultiPolygon(MultiPolygon(vec![unit_square(0.0, 0.0)]));
        assert_ne!(GeometryKey::new(&single), GeometryKey::new(&multi));
    }

    #[test]
    fn test_explode_flattens_collections() {
        let gc = Geometry::GeometryCollection(GeometryCollection(vec![
            Geometry::MultiPolygon(MultiPolygon(vec![unit_square(0.0, 0.0), unit_square(5.0, 5.0)])),
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)]),
            Geometry::Point(point!(x: 2.0, y: 2.0)),
        ]));

        let parts = explode(gc);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().filter(|g| is_polygonal(g)).count(), 2);
    }

    #[test]
    fn test_envelope_index_candidates() {
        let geometries: Vec<Geometry<f64>> = vec![
            unit_square(0.0, 0.0).into(),
            unit_square(10.0, 10.0).into(),
            unit_square(0.5, 0.5).into(),
        ];
        let index = EnvelopeIndex::new(&geometries);
        assert_eq!(index.len(), 3);

        let query: Geometry<f64> = point!(x: 0.75, y: 0.75).into();
        assert_eq!(index.candidates(&query), vec![0, 2]);

        let far: Geometry<f64> = point!(x: 100.0, y: 100.0).into();
        assert!(index.candidates(&far).is_empty());
    }

    #[test]
    fn test_geos_roundtrip_and_empty() {
        let square: Geometry<f64> = unit_square(0.0, 0.0).into();
        let back = from_geos(to_geos(&square).unwrap()).unwrap().unwrap();
        assert_eq!(count_unique([&square, &back]), 1);

        let a = to_geos(&square).unwrap();
        let far = to_geos(&unit_square(10.0, 10.0).into()).unwrap();
        let empty = a.intersection(&far).unwrap();
        assert!(from_geos(empty).unwrap().is_none());
    }
}
