use demand311::{init_logging, pipeline_config_from_env, run_daily_aggregation, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("aggregate_daily", &cfg.logging);

    let series = run_daily_aggregation(&cfg)?;

    let total: u64 = series.points().iter().map(|p| p.count).sum();
    println!(
        "Aggregated {} requests into {} days ({} → {})",
        total,
        series.len(),
        series.first_date().map(|d| d.to_string()).unwrap_or_default(),
        series.last_date().map(|d| d.to_string()).unwrap_or_default()
    );
    println!("Wrote {}", cfg.paths.daily_counts.display());

    stage.finish(series.len());
    Ok(())
}
