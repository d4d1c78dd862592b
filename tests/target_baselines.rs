use chrono::{Days, NaiveDate};
use demand311::{
    build_features, build_targets, evaluate_feature_baselines, evaluate_target_baselines,
    join_by_date, read_targets, run_target_baselines, run_target_build, write_daily_counts,
    BaselinePredictor, DailyCount, DailySeries, FeatureConfig, PipelineConfig, PipelinePaths,
    TargetError,
};
use tempfile::TempDir;

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.checked_add_days(Days::new(offset)))
        .expect("valid test date")
}

fn series_of(counts: &[u64]) -> DailySeries {
    DailySeries::from_sorted(
        counts
            .iter()
            .enumerate()
            .map(|(i, c)| DailyCount::new(day(i as u64), *c))
            .collect(),
    )
    .expect("sorted test series")
}

fn ramp(days: u64) -> Vec<u64> {
    (1..=days).collect()
}

#[test]
fn target_is_mean_of_the_following_week() {
    let rows = build_targets(&series_of(&ramp(10)), 7).expect("targets");

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].date, day(0));
    assert_eq!(rows[0].count, 1);
    assert!((rows[0].target - 5.0).abs() < 1e-12);
    assert!((rows[2].target - 7.0).abs() < 1e-12);
}

#[test]
fn target_rows_drop_the_last_horizon_days() {
    for days in [5_u64, 7, 8, 30] {
        let rows = build_targets(&series_of(&ramp(days)), 7).expect("targets");
        assert_eq!(rows.len() as u64, days.saturating_sub(7));
    }
}

#[test]
fn zero_horizon_and_gaps_are_rejected() {
    let err = build_targets(&series_of(&ramp(10)), 0).expect_err("zero horizon");
    assert!(matches!(err, TargetError::InvalidHorizon));

    let gappy = DailySeries::from_sorted(vec![
        DailyCount::new(day(0), 1),
        DailyCount::new(day(2), 3),
    ])
    .expect("sorted");
    let err = build_targets(&gappy, 1).expect_err("gap");
    assert!(matches!(err, TargetError::NonContiguous { missing } if missing == day(1)));
}

#[test]
fn target_baselines_score_both_predictors() {
    // count_t = t + 1 and target_t = t + 5: the naive forecast is off by 4 and
    // the trailing inclusive 7-day mean (t - 2) is off by 7.
    let rows = build_targets(&series_of(&ramp(20)), 7).expect("targets");
    assert_eq!(rows.len(), 13);

    let scores = evaluate_target_baselines(&rows).expect("scores");
    let naive = scores[&BaselinePredictor::NaiveLag1];
    let rolling = scores[&BaselinePredictor::RollingMean7];

    assert!((naive.mae - 4.0).abs() < 1e-12);
    assert!((naive.rmse - 4.0).abs() < 1e-12);
    assert_eq!(naive.n, 13);
    assert!((rolling.mae - 7.0).abs() < 1e-12);
    assert_eq!(rolling.n, 7);
}

#[test]
fn feature_baselines_use_lag_and_rolling_columns() {
    let (schema, rows, _) =
        build_features(&series_of(&ramp(30)), &FeatureConfig::default()).expect("features");

    let scores = evaluate_feature_baselines(&schema, &rows).expect("scores");
    let naive = scores[&BaselinePredictor::NaiveLag1];
    let rolling = scores[&BaselinePredictor::RollingMean7];

    assert!((naive.mae - 1.0).abs() < 1e-12);
    assert!((rolling.mae - 4.0).abs() < 1e-12);
    assert_eq!(naive.n, 16);
    assert_eq!(rolling.n, 16);
}

#[test]
fn join_pairs_features_with_same_date_targets() {
    let series = series_of(&ramp(30));
    let (_, features, _) = build_features(&series, &FeatureConfig::default()).expect("features");
    let targets = build_targets(&series, 7).expect("targets");

    let joined = join_by_date(&features, &targets);
    // Features start at day 14, targets end at day 22.
    assert_eq!(joined.len(), 9);
    assert_eq!(joined[0].0.date, day(14));
    assert!((joined[0].1 - 19.0).abs() < 1e-12);
}

#[test]
fn target_file_round_trips_through_the_runner() {
    let dir = TempDir::new().expect("temp dir");
    let cfg = PipelineConfig {
        paths: PipelinePaths::under(dir.path(), dir.path().join("raw.csv")),
        ..PipelineConfig::default()
    };
    write_daily_counts(&cfg.paths.filled_counts, &series_of(&ramp(20))).expect("seed");

    let built = run_target_build(&cfg).expect("target build");
    let read = read_targets(&cfg.paths.target).expect("read targets");
    assert_eq!(built, read);

    let text = std::fs::read_to_string(&cfg.paths.target).expect("target file");
    assert!(text.starts_with("date,daily_request_count,target_7day_avg\n2024-01-01,1,5.0\n"));

    let scores = run_target_baselines(&cfg).expect("baselines from file");
    assert!((scores[&BaselinePredictor::NaiveLag1].mae - 4.0).abs() < 1e-12);
}
