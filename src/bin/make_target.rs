use demand311::{init_logging, pipeline_config_from_env, run_target_build, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("make_target", &cfg.logging);

    let rows = run_target_build(&cfg)?;

    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => println!(
            "Built {} target rows ({} → {}), horizon {} days",
            rows.len(),
            first.date,
            last.date,
            cfg.target_horizon_days
        ),
        _ => println!(
            "No target rows: fewer than {} days after the first date",
            cfg.target_horizon_days + 1
        ),
    }
    println!("Wrote {}", cfg.paths.target.display());

    stage.finish(rows.len());
    Ok(())
}
