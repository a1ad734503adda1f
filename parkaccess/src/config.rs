use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::collect::global_variables::{
    get_data_path, get_result_path, BOUNDARY_FILE, BUFFER_DISTANCE, BUFFER_ZONE_FILE, COMBINED_BUFFER_MAP_FILE,
    CONFIG_FILE, INTERACTIVE_MAP_FILE, LAKES_FILE, PARK_NAME, RAW_MAP_FILE, ROADS_FILE, STATIC_MAP_FILE, TARGET_EPSG,
    TRAILS_FILE,
};
use crate::geo_core::{Crs, GeoCore};
use crate::geometric::corridor::{DegeneratePolicy, DEFAULT_QUADRANT_SEGMENTS};
use crate::geometric::layer::LayerKind;

/// Input file names, relative to `data_dir`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerFiles {
    pub boundary: String,
    pub lakes: String,
    pub roads: String,
    pub trails: String,
    pub buffer_zone: String,
}

impl Default for LayerFiles {
    fn default() -> Self {
        Self {
            boundary: BOUNDARY_FILE.to_string(),
            lakes: LAKES_FILE.to_string(),
            roads: ROADS_FILE.to_string(),
            trails: TRAILS_FILE.to_string(),
            buffer_zone: BUFFER_ZONE_FILE.to_string(),
        }
    }
}

impl LayerFiles {
    pub fn get(&self, kind: LayerKind) -> &str {
        match kind {
            LayerKind::Boundary => &self.boundary,
            LayerKind::Lakes => &self.lakes,
            LayerKind::Roads => &self.roads,
            LayerKind::Trails => &self.trails,
            LayerKind::BufferZone => &self.buffer_zone,
        }
    }
}

/// Output file names, relative to `output_dir`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputFiles {
    pub raw_map: String,
    pub combined_buffer_map: String,
    pub static_map: String,
    pub interactive_map: String,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            raw_map: RAW_MAP_FILE.to_string(),
            combined_buffer_map: COMBINED_BUFFER_MAP_FILE.to_string(),
            static_map: STATIC_MAP_FILE.to_string(),
            interactive_map: INTERACTIVE_MAP_FILE.to_string(),
        }
    }
}

/// Base layer of the interactive map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseTiles {
    #[default]
    Cartodbpositron,
    Openstreetmap,
}

impl BaseTiles {
    pub fn url(&self) -> &'static str {
        match self {
            BaseTiles::Cartodbpositron => "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
            BaseTiles::Openstreetmap => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
        }
    }

    pub fn attribution(&self) -> &'static str {
        match self {
            BaseTiles::Cartodbpositron => {
                "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors &copy; <a href=\"https://carto.com/attributions\">CARTO</a>"
            }
            BaseTiles::Openstreetmap => {
                "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MapConfig {
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub tiles: BaseTiles,
    pub control_scale: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [27.6, 84.4],
            zoom: 11,
            tiles: BaseTiles::default(),
            control_scale: true,
        }
    }
}

/// Settings of one analysis run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Used in map titles
    pub park_name: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub layers: LayerFiles,
    pub outputs: OutputFiles,
    pub target_epsg: u32,
    /// Buffer radius in target CRS units (metres for UTM)
    pub buffer_distance: f64,
    pub quadrant_segments: i32,
    pub degenerate_policy: DegeneratePolicy,
    /// Source CRS used instead of the one read from the file
    pub source_crs_overrides: BTreeMap<LayerKind, u32>,
    pub map: MapConfig,
    /// Also write the combined buffer and accessible lakes as GeoJSON
    pub export_geojson: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            park_name: PARK_NAME.to_string(),
            data_dir: get_data_path(),
            output_dir: get_result_path(),
            layers: LayerFiles::default(),
            outputs: OutputFiles::default(),
            target_epsg: TARGET_EPSG,
            buffer_distance: BUFFER_DISTANCE,
            quadrant_segments: DEFAULT_QUADRANT_SEGMENTS,
            degenerate_policy: DegeneratePolicy::default(),
            source_crs_overrides: BTreeMap::new(),
            map: MapConfig::default(),
            export_geojson: false,
        }
    }
}

impl AnalysisConfig {
    /// Read a YAML configuration. Relative directories are resolved against
    /// the directory holding the file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        let config: AnalysisConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;
        config.validate()?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolved_against(base_dir))
    }

    /// `<base_dir>/parkaccess.yaml` when present, defaults relative to `base_dir` otherwise
    pub fn load_or_default(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if path.is_file() {
            info!(path = %path.display(), "configuration loaded");
            return Self::load(&path);
        }
        info!(base_dir = %base_dir.display(), "no configuration file, using defaults");
        Ok(AnalysisConfig::default().resolved_against(base_dir))
    }

    fn resolved_against(mut self, base_dir: &Path) -> Self {
        if self.data_dir.is_relative() {
            self.data_dir = base_dir.join(&self.data_dir);
        }
        if self.output_dir.is_relative() {
            self.output_dir = base_dir.join(&self.output_dir);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.buffer_distance.is_finite() || self.buffer_distance < 0.0 {
            bail!("buffer_distance must be a non-negative number, got {}", self.buffer_distance);
        }
        if self.quadrant_segments <= 0 {
            bail!("quadrant_segments must be positive, got {}", self.quadrant_segments);
        }
        let [lat, lon] = self.map.center;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            bail!("map center [{}, {}] is not a valid [lat, lon] pair", lat, lon);
        }
        if self.target_epsg == 0 {
            bail!("target_epsg must be a valid EPSG code");
        }
        Ok(())
    }

    pub fn layer_path(&self, kind: LayerKind) -> PathBuf {
        self.data_dir.join(self.layers.get(kind))
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Reprojector configured with the target CRS and the source overrides
    pub fn geo_core(&self) -> GeoCore {
        let mut geo_core = GeoCore::new(self.target_epsg);
        for (kind, epsg) in &self.source_crs_overrides {
            geo_core.set_source_override(*kind, Crs::Epsg(*epsg));
        }
        geo_core
    }
}
