use demand311::{init_logging, pipeline_config_from_env, run_feature_baselines, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("run_baselines", &cfg.logging);

    let scores = run_feature_baselines(&cfg)?;

    println!("Baselines against daily_request_count:");
    for (predictor, score) in &scores {
        println!(
            "  {:<16} MAE={:.3} RMSE={:.3} (n={})",
            predictor.as_str(),
            score.mae,
            score.rmse,
            score.n
        );
    }

    stage.finish(scores.len());
    Ok(())
}
