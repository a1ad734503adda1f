use anyhow::{Context, Result};
use parkaccess::config::AnalysisConfig;
use parkaccess::pipeline::Pipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let base_dir = std::env::current_dir().context("Failed to read working directory")?;
    let config = AnalysisConfig::load_or_default(&base_dir)?;

    let outcome = Pipeline::new(config).run()?;

    info!(
        total_lakes = outcome.report.total_lakes,
        accessible_lakes = outcome.report.accessible_lakes,
        crs = %outcome.crs,
        "analysis complete"
    );
    for path in &outcome.outputs {
        info!(path = %path.display(), "written");
    }
    Ok(())
}
