use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{BaseTiles, MapConfig};
use crate::geometric::layer::{Feature, VectorLayer};
use crate::render::style::FeatureStyle;

const TEMPLATE_NAME: &str = "interactive_map.html";
const TEMPLATE: &str = include_str!("../../templates/interactive_map.html");

/// Property the page's style callback reads
const STYLE_PROPERTY: &str = "__style";
const FALLBACK_LEGEND_COLOR: &str = "#999999";

type StyleFn<'l> = Box<dyn Fn(&Feature) -> FeatureStyle + 'l>;

struct Overlay<'l> {
    name: String,
    layer: &'l VectorLayer,
    style: StyleFn<'l>,
}

#[derive(Serialize)]
struct OverlayContext {
    name: String,
    legend_color: String,
    geojson: serde_json::Value,
}

#[derive(Serialize)]
struct PageContext<'a> {
    title: &'a str,
    center: [f64; 2],
    zoom: u8,
    tiles_url: &'static str,
    tiles_attribution: &'static str,
    control_scale: bool,
    overlays: Vec<OverlayContext>,
}

/// Leaflet web map, one toggleable overlay per layer.
/// Layers must already be in longitude/latitude (EPSG:4326).
pub struct InteractiveMap<'l> {
    title: String,
    center: [f64; 2],
    zoom: u8,
    tiles: BaseTiles,
    control_scale: bool,
    overlays: Vec<Overlay<'l>>,
}

impl<'l> InteractiveMap<'l> {
    pub fn new(title: impl Into<String>, config: &MapConfig) -> Self {
        InteractiveMap {
            title: title.into(),
            center: config.center,
            zoom: config.zoom,
            tiles: config.tiles,
            control_scale: config.control_scale,
            overlays: Vec::new(),
        }
    }

    /// Add an overlay listed as `name` in the layer control. `style` is
    /// evaluated once per feature.
    pub fn add_layer(
        &mut self,
        name: impl Into<String>,
        layer: &'l VectorLayer,
        style: impl Fn(&Feature) -> FeatureStyle + 'l,
    ) -> &mut Self {
        self.overlays.push(Overlay {
            name: name.into(),
            layer,
            style: Box::new(style),
        });
        self
    }

    fn overlay_context(overlay: &Overlay<'_>) -> Result<OverlayContext> {
        let mut collection = overlay.layer.to_feature_collection();
        for (feature, geojson_feature) in overlay.layer.iter().zip(collection.features.iter_mut()) {
            let style = serde_json::to_value((overlay.style)(feature))?;
            geojson_feature
                .properties
                .get_or_insert_with(Default::default)
                .insert(STYLE_PROPERTY.to_string(), style);
        }

        let legend_color = overlay
            .layer
            .features
            .first()
            .map(|f| (overlay.style)(f).color)
            .unwrap_or_else(|| FALLBACK_LEGEND_COLOR.to_string());

        Ok(OverlayContext {
            name: overlay.name.clone(),
            legend_color,
            geojson: serde_json::to_value(&collection)
                .with_context(|| format!("Failed to serialize layer `{}`", overlay.layer.name))?,
        })
    }

    /// Render the HTML page
    pub fn render(&self) -> Result<String> {
        let overlays = self
            .overlays
            .iter()
            .map(Self::overlay_context)
            .collect::<Result<Vec<_>>>()?;

        let context = PageContext {
            title: &self.title,
            center: self.center,
            zoom: self.zoom,
            tiles_url: self.tiles.url(),
            tiles_attribution: self.tiles.attribution(),
            control_scale: self.control_scale,
            overlays,
        };

        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, TEMPLATE)
            .context("Failed to load map template")?;
        let html = env
            .get_template(TEMPLATE_NAME)
            .and_then(|template| template.render(&context))
            .context("Failed to render interactive map")?;
        Ok(html)
    }

    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let html = self.render()?;
        std::fs::write(path, html)
            .with_context(|| format!("Failed to write interactive map: {}", path.display()))?;
        info!(path = %path.display(), overlays = self.overlays.len(), "interactive map saved");
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::Crs;
    use crate::render::style::Color;
    use geo::{point, polygon};

    fn lakes() -> VectorLayer {
        let mut deep = Feature::new(polygon![(x: 84.40, y: 27.60), (x: 84.41, y: 27.60), (x: 84.41, y: 27.61)]);
        deep.set_property("name", "Bis Hajari Tal");
        let shallow = Feature::new(point!(x: 84.45, y: 27.55));
        VectorLayer::with_features("lakes", Some(Crs::Epsg(4326)), vec![deep, shallow])
    }

    #[test]
    fn test_page_has_overlays_controls_and_legend() {
        let lakes = lakes();
        let boundary = VectorLayer::new("boundary", Some(Crs::Epsg(4326)));
        let mut map = InteractiveMap::new("Lakes", &MapConfig::default());
        map.add_layer("Park Boundary", &boundary, |_| FeatureStyle::new(Color::BLACK, 2.0, 0.0))
            .add_layer("Accessible Lakes", &lakes, |_| FeatureStyle::new(Color::BLUE, 1.0, 0.5));

        let html = map.render().unwrap();
        assert_eq!(html.matches("L.geoJSON(").count(), 2);
        assert!(html.contains("L.control.layers(null, overlays)"));
        assert!(html.contains("L.control.scale()"));
        assert!(html.contains("basemaps.cartocdn.com/light_all"));
        assert!(html.contains("id=\"legendBox\""));
        assert!(html.contains("Toggle Legend"));
        assert!(html.contains("Accessible Lakes"));
        assert!(html.contains("Bis Hajari Tal"));
        // empty layer gets the fallback swatch
        assert!(html.contains(FALLBACK_LEGEND_COLOR));
        assert!(html.contains("#0000ff"));
    }

    #[test]
    fn test_style_is_evaluated_per_feature() {
        let lakes = lakes();
        let mut map = InteractiveMap::new("Lakes", &MapConfig::default());
        map.add_layer("Lakes", &lakes, |f| {
            if f.property("name").is_some() {
                FeatureStyle::new(Color::BLUE, 1.0, 0.5)
            } else {
                FeatureStyle::new(Color::RED, 3.0, 0.1)
            }
        });

        let overlay = InteractiveMap::overlay_context(&map.overlays[0]).unwrap();
        let features = overlay.geojson["features"].as_array().unwrap();
        assert_eq!(features[0]["properties"]["__style"]["color"], "#0000ff");
        assert_eq!(features[1]["properties"]["__style"]["color"], "#ff0000");
        assert_eq!(features[1]["properties"]["__style"]["weight"], 3.0);
        assert_eq!(overlay.legend_color, "#0000ff");
    }

    #[test]
    fn test_scale_control_can_be_disabled() {
        let config = MapConfig {
            control_scale: false,
            tiles: BaseTiles::Openstreetmap,
            ..MapConfig::default()
        };
        let html = InteractiveMap::new("Lakes", &config).render().unwrap();
        assert!(!html.contains("L.control.scale()"));
        assert!(html.contains("tile.openstreetmap.org"));
        assert!(html.contains("[27.6,84.4]"));
    }
}
