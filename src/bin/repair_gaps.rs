use demand311::{init_logging, pipeline_config_from_env, run_calendar_repair, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("repair_gaps", &cfg.logging);

    let report = run_calendar_repair(&cfg)?;

    println!(
        "Repaired {} → {}: {} input days, {} output days, {} filled ({}), {} duplicates removed",
        report.first_date,
        report.last_date,
        report.input_days,
        report.output_days,
        report.filled_days,
        cfg.fill_policy.as_str(),
        report.duplicates_removed
    );
    println!("Wrote {}", cfg.paths.filled_counts.display());

    stage.finish(report.output_days as usize);
    Ok(())
}
