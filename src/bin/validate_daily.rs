use demand311::{init_logging, pipeline_config_from_env, run_qa_audit, StageRun};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = pipeline_config_from_env()?;
    init_logging(&cfg.logging)?;
    let stage = StageRun::start("validate_daily", &cfg.logging);

    let report = run_qa_audit(&cfg)?;

    print!("{}", report.render());
    println!("Wrote {}", cfg.paths.qa_report.display());

    stage.finish(report.total_rows);
    Ok(())
}
