use demand311::{init_logging, pipeline_config_from_env, run_drift_monitor, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("monitor_drift", &cfg.logging);

    let report = run_drift_monitor(&cfg)?;

    println!("Wrote {}", cfg.paths.monitoring.display());
    match (report.latest(), report.thresholds) {
        (Some(latest), Some(thresholds)) => {
            println!("Baseline MAE: {:.3}", thresholds.baseline_mae);
            println!(
                "Latest {}: rolling MAE {:.3} → {}",
                latest.date,
                latest.rolling_mae.unwrap_or(f64::NAN),
                latest.status
            );
            println!(
                "OK <= ~{:.3} | WARN <= ~{:.3} | ALERT > that",
                thresholds.ok, thresholds.warn
            );
        }
        _ => println!("Not enough data yet to compute rolling MAE."),
    }

    stage.finish(report.rows.len());
    Ok(())
}
