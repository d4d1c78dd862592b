use demand311::{init_logging, pipeline_config_from_env, run_model_training, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("train_gb", &cfg.logging);

    let report = run_model_training(&cfg)?;

    println!(
        "{} on {}: trained on {} rows, tested on {} rows ({} → {})",
        report.model,
        cfg.training_target.as_str(),
        report.train_rows,
        report.test_rows,
        report.test_start,
        report.test_end
    );
    println!(
        "Test MAE={:.3} RMSE={:.3}",
        report.score.mae, report.score.rmse
    );

    stage.finish(report.test_rows);
    Ok(())
}
