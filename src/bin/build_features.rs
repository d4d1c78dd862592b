use demand311::{init_logging, pipeline_config_from_env, run_feature_build, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("build_features", &cfg.logging);

    let report = run_feature_build(&cfg)?;

    println!(
        "Built {} feature rows from {} days ({} dropped for {} days of history)",
        report.output_rows, report.input_rows, report.dropped_rows, report.min_history_days
    );
    println!(
        "Alignment {}: {}",
        report.rolling_alignment.as_str(),
        report.rolling_alignment.describe()
    );
    println!("Wrote {}", cfg.paths.features.display());

    stage.finish(report.output_rows as usize);
    Ok(())
}
