use anyhow::Result;
use parkaccess::collect::vector_collect::VectorCollect;
use parkaccess::config::AnalysisConfig;
use parkaccess::geometric::corridor::Corridor;
use parkaccess::geometric::water::Water;

/// Example: step-by-step lake accessibility for a park
/// Expects the park shapefiles under ./Data (see AnalysisConfig for the file names)
fn main() -> Result<()> {
    println!("=== Example: Lake accessibility from roads and trails ===\n");

    let mut config = AnalysisConfig::load_or_default(&std::env::current_dir()?)?;
    // a tighter corridor than the default 1 km
    config.buffer_distance = 500.0;

    // Load the five layers
    let layers = VectorCollect::from_config(&config).execute()?;
    for (kind, layer) in layers.iter() {
        println!("  - {:<12} {} features", kind.label(), layer.len());
    }

    // Reproject to UTM 44N
    let (layers, crs) = config.geo_core().reproject_all(&layers)?;
    println!("\nReprojected to {crs}");

    // Buffer roads and trails, then overlay the two buffer sets
    let corridor = Corridor::new(config.buffer_distance).run(&layers.roads, &layers.trails)?;
    let Some(combined) = corridor.get_combined() else {
        return Ok(());
    };
    println!("\nCombined buffer: {} pieces", combined.len());
    println!("Covered area: {:.1} km2", combined.covered_area()? / 1.0e6);

    // Spatial join with the lakes
    let water = Water::new(config.buffer_distance).run(&layers.lakes, combined);
    if let Some(report) = water.get_report() {
        println!("\nTotal lakes:      {}", report.total_lakes);
        println!("Accessible lakes: {}", report.accessible_lakes);
        println!("Join rows:        {}", report.joined_rows);
    }

    // Save accessible lakes (UTM coordinates)
    std::fs::create_dir_all(&config.output_dir)?;
    let path = water.accessible_layer().to_geojson(&config.output_dir, None)?;
    println!("\nAccessible lakes saved to {}", path.display());

    Ok(())
}
