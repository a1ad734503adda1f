use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::collect::vector_collect::VectorCollect;
use crate::config::AnalysisConfig;
use crate::geo_core::{reproject_to, Crs, WGS84_EPSG};
use crate::geometric::corridor::{CombinedBuffer, Corridor};
use crate::geometric::layer::{LayerKind, ParkLayers, VectorLayer};
use crate::geometric::water::{AccessibilityReport, Water};
use crate::render::interactive_map::InteractiveMap;
use crate::render::static_map::{StaticMap, COMBINED_BUFFER_MAP_SIZE, RAW_MAP_SIZE, STATIC_MAP_SIZE};
use crate::render::style::{Color, FeatureStyle, LegendEntry, PlotStyle};

const COMBINED_BUFFER_LABEL: &str = "Road/Trail Buffer";
const ACCESSIBLE_LAKES_LABEL: &str = "Accessible Lakes";

/// Drawing order of the raw map, bottom layer first. Legend entries follow it.
pub const RAW_MAP_ORDER: [LayerKind; 5] = [
    LayerKind::Boundary,
    LayerKind::BufferZone,
    LayerKind::Roads,
    LayerKind::Trails,
    LayerKind::Lakes,
];

/// Everything computed by one pass, all layers in the target CRS
#[derive(Debug, Clone)]
pub struct Analysis {
    pub layers: ParkLayers,
    pub crs: Crs,
    pub combined: CombinedBuffer,
    pub accessible_lakes: VectorLayer,
    pub report: AccessibilityReport,
}

/// Result of [`Pipeline::run`]
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: AccessibilityReport,
    pub crs: Crs,
    /// Files written, in the order they were produced
    pub outputs: Vec<PathBuf>,
}

/// The lake accessibility analysis, stage by stage
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Pipeline { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run every stage in order. The first failure aborts the run.
    pub fn run(&self) -> Result<PipelineOutcome> {
        info!(data_dir = %self.config.data_dir.display(), "data directory");
        info!(output_dir = %self.config.output_dir.display(), "output directory");

        let raw = self.load()?;
        let mut outputs = vec![self.render_raw_map(&raw)?];

        let analysis = self.analyse_layers(&raw)?;
        outputs.push(self.render_combined_buffer_map(&analysis.combined)?);
        outputs.push(self.render_static_map(&analysis)?);
        outputs.push(self.render_interactive_map(&analysis)?);

        if self.config.export_geojson {
            outputs.extend(self.export_geojson(&analysis)?);
        }

        Ok(PipelineOutcome {
            report: analysis.report,
            crs: analysis.crs,
            outputs,
        })
    }

    /// Load, reproject, buffer and join, without rendering anything
    pub fn analyse(&self) -> Result<Analysis> {
        let raw = self.load()?;
        self.analyse_layers(&raw)
    }

    pub fn load(&self) -> Result<ParkLayers> {
        VectorCollect::from_config(&self.config)
            .execute()
            .context("Failed to load input layers")
    }

    fn analyse_layers(&self, raw: &ParkLayers) -> Result<Analysis> {
        let (layers, crs) = self.reproject(raw)?;

        let combined = self.build_combined_buffer(&layers)?;

        let water = Water::new(self.config.buffer_distance).run(&layers.lakes, &combined);
        let report = *water
            .get_report()
            .context("Accessibility filter produced no report")?;
        info!("Total number of unique lakes in the dataset: {}", report.total_lakes);
        info!(
            "Number of unique lakes that intersect the {}m combined buffer: {}",
            report.buffer_distance, report.accessible_lakes
        );

        Ok(Analysis {
            accessible_lakes: water.accessible_layer(),
            layers,
            crs,
            combined,
            report,
        })
    }

    /// All five layers into the target CRS, checked to share one CRS
    pub fn reproject(&self, raw: &ParkLayers) -> Result<(ParkLayers, Crs)> {
        let (layers, crs) = self
            .config
            .geo_core()
            .reproject_all(raw)
            .context("Failed to reproject input layers")?;
        info!(%crs, "Unique CRS after reprojection");
        Ok((layers, crs))
    }

    pub fn build_combined_buffer(&self, layers: &ParkLayers) -> Result<CombinedBuffer> {
        let mut corridor = Corridor::new(self.config.buffer_distance);
        corridor.set_quadrant_segments(self.config.quadrant_segments);
        corridor.set_degenerate_policy(self.config.degenerate_policy);

        corridor
            .run(&layers.roads, &layers.trails)
            .context("Failed to build road/trail buffers")?
            .into_combined()
            .context("Buffer builder produced no combined buffer")
    }

    /// Input layers as loaded, drawn in [`RAW_MAP_ORDER`]
    pub fn raw_map<'a>(&self, raw: &'a ParkLayers) -> StaticMap<'a> {
        let mut map = StaticMap::new(format!("Map of {} with lakes", self.config.park_name), RAW_MAP_SIZE);
        for kind in RAW_MAP_ORDER {
            let style = raw_style(kind);
            map.add_layer(raw.get(kind), style);
            map.add_legend_entry(LegendEntry::new(kind.label(), style));
        }
        map
    }

    pub fn render_raw_map(&self, raw: &ParkLayers) -> Result<PathBuf> {
        let path = self.config.output_path(&self.config.outputs.raw_map);
        self.raw_map(raw).save(&path).context("Failed to save raw map")
    }

    pub fn render_combined_buffer_map(&self, combined: &CombinedBuffer) -> Result<PathBuf> {
        let mut map = StaticMap::new("Combined Buffers", COMBINED_BUFFER_MAP_SIZE);
        map.add_layer(combined.layer(), PlotStyle::filled(Color::LIGHT_GRAY, Color::RED));

        let path = self.config.output_path(&self.config.outputs.combined_buffer_map);
        map.save(&path).context("Failed to save combined buffer map")
    }

    /// Park boundary, buffer zone, combined buffer and accessible lakes
    pub fn static_map<'a>(&self, analysis: &'a Analysis) -> StaticMap<'a> {
        let boundary = PlotStyle::outline(Color::BLACK, 1);
        let buffer_zone = PlotStyle::outline(Color::GREEN, 1);
        let buffer = PlotStyle::filled(Color::LIGHT_GRAY, Color::RED).with_alpha(0.3);
        let lakes = PlotStyle::solid(Color::BLUE);

        let mut map = StaticMap::new(
            format!("Accessibility of Lakes in {}", self.config.park_name),
            STATIC_MAP_SIZE,
        );
        map.add_layer(&analysis.layers.boundary, boundary)
            .add_layer(&analysis.layers.buffer_zone, buffer_zone)
            .add_layer(analysis.combined.layer(), buffer)
            .add_layer(&analysis.accessible_lakes, lakes)
            .add_legend_entry(LegendEntry::new(LayerKind::Boundary.label(), boundary))
            .add_legend_entry(LegendEntry::new(LayerKind::BufferZone.label(), buffer_zone))
            .add_legend_entry(LegendEntry::new(COMBINED_BUFFER_LABEL, buffer))
            .add_legend_entry(LegendEntry::new(ACCESSIBLE_LAKES_LABEL, lakes));
        map
    }

    pub fn render_static_map(&self, analysis: &Analysis) -> Result<PathBuf> {
        let path = self.config.output_path(&self.config.outputs.static_map);
        self.static_map(analysis).save(&path).context("Failed to save static map")
    }

    /// Web map of the results, every layer brought to EPSG:4326 first
    pub fn render_interactive_map(&self, analysis: &Analysis) -> Result<PathBuf> {
        let wgs84 = Crs::Epsg(WGS84_EPSG);
        let boundary = reproject_to(&analysis.layers.boundary, &wgs84)?;
        let buffer_zone = reproject_to(&analysis.layers.buffer_zone, &wgs84)?;
        let combined = reproject_to(analysis.combined.layer(), &wgs84)?;
        let lakes = reproject_to(&analysis.accessible_lakes, &wgs84)?;

        let mut map = InteractiveMap::new(
            format!("Accessibility of Lakes in {}", self.config.park_name),
            &self.config.map,
        );
        map.add_layer(LayerKind::Boundary.label(), &boundary, |_| {
            FeatureStyle::new(Color::BLACK, 2.0, 0.0)
        })
        .add_layer(LayerKind::BufferZone.label(), &buffer_zone, |_| {
            FeatureStyle::new(Color::GREEN, 2.0, 0.0)
        })
        .add_layer(COMBINED_BUFFER_LABEL, &combined, |_| FeatureStyle::new(Color::RED, 1.0, 0.2))
        .add_layer(ACCESSIBLE_LAKES_LABEL, &lakes, |_| FeatureStyle::new(Color::BLUE, 1.0, 0.5));

        let path = self.config.output_path(&self.config.outputs.interactive_map);
        map.save(&path).context("Failed to save interactive map")
    }

    /// Combined buffer and accessible lakes as GeoJSON in EPSG:4326
    pub fn export_geojson(&self, analysis: &Analysis) -> Result<Vec<PathBuf>> {
        let wgs84 = Crs::Epsg(WGS84_EPSG);
        [analysis.combined.layer(), &analysis.accessible_lakes]
            .into_iter()
            .map(|layer| {
                reproject_to(layer, &wgs84)
                    .map_err(anyhow::Error::from)
                    .and_then(|layer| layer.to_geojson(&self.config.output_dir, None))
            })
            .collect()
    }
}

fn raw_style(kind: LayerKind) -> PlotStyle {
    match kind {
        LayerKind::Boundary => PlotStyle::outline(Color::BLACK, 1),
        LayerKind::BufferZone => PlotStyle::outline(Color::GREEN, 1),
        LayerKind::Roads => PlotStyle::outline(Color::RED, 1),
        LayerKind::Trails => PlotStyle::outline(Color::ORANGE, 1),
        LayerKind::Lakes => PlotStyle::solid(Color::BLUE),
    }
}
