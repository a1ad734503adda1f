use anyhow::{anyhow, Result};
use geo::{Geometry, LineString, Polygon as GeoPolygon};
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::Color as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::commons::basic_functions::explode;
use crate::geo_core::BoundingBox;
use crate::geometric::layer::VectorLayer;
use crate::render::style::{Color, LegendEntry, PlotStyle};

/// 12x8 inches at 150 dpi
pub const RAW_MAP_SIZE: (u32, u32) = (1800, 1200);
pub const COMBINED_BUFFER_MAP_SIZE: (u32, u32) = (1800, 1200);
/// 12x6 inches at 150 dpi
pub const STATIC_MAP_SIZE: (u32, u32) = (1800, 900);

const MARGIN: i32 = 20;
const EXTENT_PADDING: f64 = 0.02;
const POINT_RADIUS: i32 = 4;

type MapChart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Matplotlib-like static map: layers drawn in order, later ones on top
pub struct StaticMap<'l> {
    title: String,
    size: (u32, u32),
    layers: Vec<(&'l VectorLayer, PlotStyle)>,
    legend: Vec<LegendEntry>,
}

impl<'l> StaticMap<'l> {
    pub fn new(title: impl Into<String>, size: (u32, u32)) -> Self {
        StaticMap {
            title: title.into(),
            size,
            layers: Vec::new(),
            legend: Vec::new(),
        }
    }

    pub fn add_layer(&mut self, layer: &'l VectorLayer, style: PlotStyle) -> &mut Self {
        self.layers.push((layer, style));
        self
    }

    pub fn add_legend_entry(&mut self, entry: LegendEntry) -> &mut Self {
        self.legend.push(entry);
        self
    }

    /// Layer names in drawing order
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|(layer, _)| layer.name.as_str()).collect()
    }

    /// Legend labels, top to bottom
    pub fn legend_labels(&self) -> Vec<&str> {
        self.legend.iter().map(|entry| entry.label.as_str()).collect()
    }

    /// Joint extent of all layers, padded
    pub fn extent(&self) -> Option<BoundingBox> {
        self.layers
            .iter()
            .filter_map(|(layer, _)| layer.bounding_rect())
            .map(BoundingBox::from_rect)
            .reduce(|a, b| a.union(&b))
            .map(|bbox| {
                if bbox.width() == 0.0 && bbox.height() == 0.0 {
                    BoundingBox::new(bbox.min_x - 1.0, bbox.min_y - 1.0, bbox.max_x + 1.0, bbox.max_y + 1.0)
                } else {
                    bbox.pad(EXTENT_PADDING)
                }
            })
    }

    /// Render to a PNG file
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let root = BitMapBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| anyhow!("Failed to fill canvas of {}: {}", path.display(), e))?;

        // text needs a system font; without one the map is drawn untitled
        let area = if self.title.is_empty() {
            root.margin(MARGIN, MARGIN, MARGIN, MARGIN)
        } else {
            match root.titled(&self.title, ("sans-serif", 40)) {
                Ok(area) => area.margin(MARGIN, MARGIN, MARGIN, MARGIN),
                Err(e) => {
                    warn!(title = %self.title, "title not drawn: {}", e);
                    root.margin(MARGIN, MARGIN, MARGIN, MARGIN)
                }
            }
        };

        // equal aspect: the data window takes the pixel ratio of the plotting area
        let (width, height) = area.dim_in_pixel();
        let aspect = f64::from(width.max(1)) / f64::from(height.max(1));
        let window = self
            .extent()
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            .fit_aspect(aspect);

        let mut chart = ChartBuilder::on(&area)
            .build_cartesian_2d(window.min_x..window.max_x, window.min_y..window.max_y)
            .map_err(|e| anyhow!("Failed to build chart: {}", e))?;

        for (layer, style) in &self.layers {
            draw_layer(&mut chart, layer, style)
                .map_err(|e| anyhow!("Failed to draw layer `{}`: {}", layer.name, e))?;
        }

        if !self.legend.is_empty() {
            for entry in &self.legend {
                let (fill, outline) = swatch_styles(&entry.style);
                chart
                    .draw_series(std::iter::empty::<Rectangle<(f64, f64)>>())
                    .map_err(|e| anyhow!("Failed to draw legend: {}", e))?
                    .label(entry.label.as_str())
                    .legend(move |(x, y)| {
                        EmptyElement::at((x, y))
                            + Rectangle::new([(0, -6), (18, 6)], fill)
                            + Rectangle::new([(0, -6), (18, 6)], outline)
                    });
            }
            if let Err(e) = chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .label_font(("sans-serif", 20))
                .draw()
            {
                warn!(entries = self.legend.len(), "legend not drawn: {}", e);
            }
        }

        root.present()
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
        info!(path = %path.display(), "static map saved");
        Ok(path.to_path_buf())
    }
}

fn swatch_styles(style: &PlotStyle) -> (ShapeStyle, ShapeStyle) {
    let fill = match style.face {
        Some(face) => face.to_rgba(style.alpha).filled(),
        None => TRANSPARENT.filled(),
    };
    let outline = match style.stroke_color() {
        Some(edge) => edge.to_rgba(style.alpha).stroke_width(style.line_width),
        None => TRANSPARENT.stroke_width(1),
    };
    (fill, outline)
}

fn ring(line: &LineString<f64>) -> Vec<(f64, f64)> {
    line.coords().map(|c| (c.x, c.y)).collect()
}

fn push_polygon(
    polygon: &GeoPolygon<f64>,
    face: Option<ShapeStyle>,
    edge: Option<ShapeStyle>,
    fills: &mut Vec<Polygon<(f64, f64)>>,
    paths: &mut Vec<PathElement<(f64, f64)>>,
) {
    if let Some(face) = face {
        fills.push(Polygon::new(ring(polygon.exterior()), face));
    }
    if let Some(edge) = edge {
        for line in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            paths.push(PathElement::new(ring(line), edge));
        }
    }
}

fn draw_layer(chart: &mut MapChart<'_, '_>, layer: &VectorLayer, style: &PlotStyle) -> Result<()> {
    let mut fills: Vec<Polygon<(f64, f64)>> = Vec::new();
    let mut paths: Vec<PathElement<(f64, f64)>> = Vec::new();
    let mut points: Vec<Circle<(f64, f64), i32>> = Vec::new();

    let face = style.face.map(|c| c.to_rgba(style.alpha).filled());
    let edge = style.edge.map(|c| c.to_rgba(style.alpha).stroke_width(style.line_width));
    let stroke = style
        .stroke_color()
        .unwrap_or(Color::BLACK)
        .to_rgba(style.alpha)
        .stroke_width(style.line_width);

    for geometry in layer.geometries().cloned().flat_map(explode) {
        match geometry {
            Geometry::Polygon(p) => push_polygon(&p, face, edge, &mut fills, &mut paths),
            Geometry::Rect(r) => push_polygon(&r.to_polygon(), face, edge, &mut fills, &mut paths),
            Geometry::Triangle(t) => push_polygon(&t.to_polygon(), face, edge, &mut fills, &mut paths),
            Geometry::LineString(l) => paths.push(PathElement::new(ring(&l), stroke)),
            Geometry::Line(l) => paths.push(PathElement::new(vec![l.start.x_y(), l.end.x_y()], stroke)),
            Geometry::Point(p) => points.push(Circle::new(p.x_y(), POINT_RADIUS, stroke.filled())),
            // explode leaves no multi-geometries or collections
            _ => {}
        }
    }

    chart.draw_series(fills).map_err(|e| anyhow!("{}", e))?;
    chart.draw_series(paths).map_err(|e| anyhow!("{}", e))?;
    chart.draw_series(points).map_err(|e| anyhow!("{}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::layer::Feature;
    use geo::{line_string, point, polygon};
    use tempfile::TempDir;

    fn park() -> VectorLayer {
        let boundary = polygon![(x: 0.0, y: 0.0), (x: 4000.0, y: 0.0), (x: 4000.0, y: 2000.0), (x: 0.0, y: 2000.0)];
        VectorLayer::with_features("boundary", None, vec![Feature::new(boundary)])
    }

    #[test]
    fn test_extent_spans_layers_with_padding() {
        let boundary = park();
        let roads = VectorLayer::with_features(
            "roads",
            None,
            vec![Feature::new(line_string![(x: -1000.0, y: 500.0), (x: 0.0, y: 500.0)])],
        );
        let mut map = StaticMap::new("", RAW_MAP_SIZE);
        map.add_layer(&boundary, PlotStyle::outline(Color::BLACK, 1))
            .add_layer(&roads, PlotStyle::outline(Color::RED, 1));

        let extent = map.extent().unwrap();
        assert!(extent.min_x < -1000.0);
        assert!(extent.max_x > 4000.0);
        assert!(extent.min_y < 0.0 && extent.max_y > 2000.0);
    }

    #[test]
    fn test_layers_and_legend_keep_insertion_order() {
        let boundary = park();
        let lakes = VectorLayer::with_features("lakes", None, vec![Feature::new(point!(x: 5.0, y: 5.0))]);
        let mut map = StaticMap::new("", RAW_MAP_SIZE);
        map.add_layer(&lakes, PlotStyle::solid(Color::BLUE))
            .add_layer(&boundary, PlotStyle::outline(Color::BLACK, 1))
            .add_legend_entry(LegendEntry::new("Lakes", PlotStyle::solid(Color::BLUE)))
            .add_legend_entry(LegendEntry::new("Park Boundary", PlotStyle::outline(Color::BLACK, 1)));

        assert_eq!(map.layer_names(), ["lakes", "boundary"]);
        assert_eq!(map.legend_labels(), ["Lakes", "Park Boundary"]);
    }

    #[test]
    fn test_single_point_extent_is_not_degenerate() {
        let wells = VectorLayer::with_features("wells", None, vec![Feature::new(point!(x: 5.0, y: 5.0))]);
        let mut map = StaticMap::new("", STATIC_MAP_SIZE);
        map.add_layer(&wells, PlotStyle::solid(Color::BLUE));
        let extent = map.extent().unwrap();
        assert!(extent.width() > 0.0 && extent.height() > 0.0);
    }

    #[test]
    fn test_save_writes_png() {
        let dir = TempDir::new().unwrap();
        let boundary = park();
        let lakes = VectorLayer::with_features(
            "lakes",
            None,
            vec![Feature::new(polygon![(x: 100.0, y: 100.0), (x: 300.0, y: 100.0), (x: 300.0, y: 300.0)])],
        );
        let empty = VectorLayer::new("roads", None);

        let mut map = StaticMap::new("", (320, 200));
        map.add_layer(&boundary, PlotStyle::outline(Color::BLACK, 1))
            .add_layer(&empty, PlotStyle::outline(Color::RED, 1))
            .add_layer(&lakes, PlotStyle::filled(Color::LIGHT_GRAY, Color::RED).with_alpha(0.3));

        let path = map.save(&dir.path().join("map.png")).unwrap();
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_empty_map_still_renders() {
        let dir = TempDir::new().unwrap();
        let map = StaticMap::new("", (100, 100));
        assert!(map.extent().is_none());
        assert!(map.save(&dir.path().join("blank.png")).unwrap().exists());
    }
}
