use std::path::PathBuf;

pub const DATA_PATH: &str = "Data";
pub const RESULT_PATH: &str = "result";
pub const CONFIG_FILE: &str = "parkaccess.yaml";

pub const PARK_NAME: &str = "Chitwan National Park";

pub const BOUNDARY_FILE: &str = "Chitwan_National_Park.shp";
pub const LAKES_FILE: &str = "Lakes_CNP.shp";
pub const ROADS_FILE: &str = "CNP_Road.shp";
pub const TRAILS_FILE: &str = "Trail.shp";
pub const BUFFER_ZONE_FILE: &str = "CNP_Buffer_Zone.shp";

pub const RAW_MAP_FILE: &str = "Raw_map.png";
pub const COMBINED_BUFFER_MAP_FILE: &str = "combined buffer.png";
pub const STATIC_MAP_FILE: &str = "static_map.png";
pub const INTERACTIVE_MAP_FILE: &str = "interactive_map.html";

/// UTM zone 44N
pub const TARGET_EPSG: u32 = 32644;
/// Meters in the target CRS
pub const BUFFER_DISTANCE: f64 = 1000.0;

pub fn get_data_path() -> PathBuf {
    PathBuf::from(DATA_PATH)
}

pub fn get_result_path() -> PathBuf {
    PathBuf::from(RESULT_PATH)
}
