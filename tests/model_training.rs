use chrono::{Days, NaiveDate};
use demand311::{
    build_features, build_targets, build_training_set, run_model_training, time_split,
    train_and_evaluate, write_daily_counts, write_features, write_targets, DailyCount,
    DailySeries, FeatureConfig, GbConfig, GradientBoostingRegressor, ModelError, PipelineConfig,
    PipelinePaths, Regressor, TrainingSet, TrainingTarget,
};
use tempfile::TempDir;

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.checked_add_days(Days::new(offset)))
        .expect("valid test date")
}

fn weekly_series(days: u64) -> DailySeries {
    let pattern = [120_u64, 135, 128, 131, 140, 82, 75];
    DailySeries::from_sorted(
        (0..days)
            .map(|i| DailyCount::new(day(i), pattern[(i % 7) as usize] + i / 7))
            .collect(),
    )
    .expect("sorted test series")
}

fn ramp_set(n: usize) -> TrainingSet {
    TrainingSet {
        feature_names: vec!["x".to_string()],
        dates: (0..n as u64).map(day).collect(),
        features: (0..n).map(|i| vec![i as f64]).collect(),
        target: (1..=n).map(|y| y as f64).collect(),
    }
}

/// Predicts the training mean; remembers how many rows it saw.
#[derive(Default)]
struct MeanRegressor {
    mean: Option<f64>,
    fit_rows: usize,
}

impl Regressor for MeanRegressor {
    fn fit(&mut self, _features: &[Vec<f64>], target: &[f64]) -> Result<(), ModelError> {
        if target.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        self.fit_rows = target.len();
        self.mean = Some(target.iter().sum::<f64>() / target.len() as f64);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let mean = self.mean.ok_or(ModelError::NotFitted)?;
        Ok(vec![mean; features.len()])
    }

    fn name(&self) -> &str {
        "mean"
    }
}

#[test]
fn split_is_chronological_without_shuffling() {
    let set = ramp_set(10);
    let (train, test) = time_split(&set, 0.2).expect("split");

    assert_eq!(train.len(), 8);
    assert_eq!(test.len(), 2);
    assert_eq!(train.dates.last(), Some(&day(7)));
    assert_eq!(test.dates, vec![day(8), day(9)]);
    assert!(train.dates.iter().all(|d| d < &test.dates[0]));
}

#[test]
fn split_rejects_degenerate_sides() {
    assert!(matches!(
        time_split(&ramp_set(1), 0.2),
        Err(ModelError::InvalidSplit(_))
    ));
    assert!(matches!(
        time_split(&ramp_set(10), 0.0),
        Err(ModelError::InvalidSplit(_))
    ));
    assert!(matches!(
        time_split(&ramp_set(10), 1.0),
        Err(ModelError::InvalidSplit(_))
    ));

    let (train, test) = time_split(&ramp_set(3), 0.2).expect("floor split");
    assert_eq!((train.len(), test.len()), (2, 1));
}

#[test]
fn evaluation_scores_only_the_held_out_tail() {
    let mut model = MeanRegressor::default();
    let report = train_and_evaluate(&mut model, &ramp_set(10), 0.2).expect("evaluate");

    assert_eq!(model.fit_rows, 8);
    assert_eq!(report.model, "mean");
    assert_eq!(report.train_rows, 8);
    assert_eq!(report.test_rows, 2);
    assert_eq!(report.test_start, day(8));
    assert_eq!(report.test_end, day(9));
    // Train mean 4.5 against held-out truths 9 and 10.
    assert!((report.score.mae - 5.0).abs() < 1e-12);
    assert_eq!(report.score.n, 2);
}

#[test]
fn training_set_uses_every_schema_column() {
    let (schema, rows, _) =
        build_features(&weekly_series(60), &FeatureConfig::default()).expect("features");
    let set = build_training_set(&schema, &rows, TrainingTarget::DailyCount, None).expect("set");

    assert_eq!(set.feature_names.len(), 9);
    assert_eq!(set.len(), 46);
    assert!(set.features.iter().all(|row| row.len() == 9));
    assert_eq!(set.target[0], rows[0].count as f64);
}

#[test]
fn forward_average_target_requires_target_rows() {
    let (schema, rows, _) =
        build_features(&weekly_series(30), &FeatureConfig::default()).expect("features");
    let err = build_training_set(&schema, &rows, TrainingTarget::ForwardAverage, None)
        .expect_err("targets missing");
    assert!(matches!(err, ModelError::MissingTargets(_)));
}

#[test]
fn gradient_boosting_is_deterministic_and_beats_the_mean_on_weekly_data() {
    let (schema, rows, _) =
        build_features(&weekly_series(120), &FeatureConfig::default()).expect("features");
    let set = build_training_set(&schema, &rows, TrainingTarget::DailyCount, None).expect("set");

    let mut gb_a = GradientBoostingRegressor::new(GbConfig::default());
    let mut gb_b = GradientBoostingRegressor::new(GbConfig::default());
    let report_a = train_and_evaluate(&mut gb_a, &set, 0.2).expect("first fit");
    let report_b = train_and_evaluate(&mut gb_b, &set, 0.2).expect("second fit");
    assert_eq!(report_a, report_b);
    assert_eq!(gb_a.tree_count(), 300);

    let mut mean = MeanRegressor::default();
    let mean_report = train_and_evaluate(&mut mean, &set, 0.2).expect("mean fit");
    assert!(report_a.score.mae < mean_report.score.mae);
    assert!(report_a.score.mae.is_finite());
}

#[test]
fn runner_trains_on_forward_average_from_files() {
    let dir = TempDir::new().expect("temp dir");
    let cfg = PipelineConfig {
        paths: PipelinePaths::under(dir.path(), dir.path().join("raw.csv")),
        training_target: TrainingTarget::ForwardAverage,
        model: GbConfig {
            n_estimators: 50,
            ..GbConfig::default()
        },
        ..PipelineConfig::default()
    };
    let series = weekly_series(60);
    write_daily_counts(&cfg.paths.filled_counts, &series).expect("seed counts");
    let (schema, rows, _) = build_features(&series, &cfg.features).expect("features");
    write_features(&cfg.paths.features, &schema, &rows).expect("write features");
    let targets = build_targets(&series, cfg.target_horizon_days).expect("targets");
    write_targets(&cfg.paths.target, &targets).expect("write targets");

    let report = run_model_training(&cfg).expect("training run");
    // Feature days 14..=59 joined with target days 0..=52.
    assert_eq!(report.train_rows + report.test_rows, 39);
    assert_eq!(report.train_rows, 31);
    assert_eq!(report.test_end, day(52));
}
