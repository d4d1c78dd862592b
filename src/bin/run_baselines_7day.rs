use demand311::{
    init_logging, pipeline_config_from_env, run_target_baselines, StageRun, TARGET_COLUMN,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("run_baselines_7day", &cfg.logging);

    let scores = run_target_baselines(&cfg)?;

    println!("Baselines against {TARGET_COLUMN}:");
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
