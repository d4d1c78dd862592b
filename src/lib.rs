//! Daily service-request demand pipeline.
//!
//! Stages, in run order:
//! - aggregate raw requests into daily counts
//! - audit the daily counts (read-only)
//! - repair calendar gaps
//! - build lag/rolling/calendar features and the forward 7-day target
//! - score naive baselines and train a gradient-boosted regressor
//! - monitor drift of the 7-day persistence forecast

mod aggregate;
mod baseline;
mod config;
mod features;
mod metrics;
mod model;
mod monitor;
mod observability;
mod qa;
mod repair;
mod series;
mod target;
mod window;

pub use aggregate::{
    aggregate_file, aggregate_records, run_daily_aggregation, AggregateError,
    DEFAULT_TIMESTAMP_COLUMN,
};
pub use baseline::{
    evaluate_feature_baselines, evaluate_target_baselines, run_feature_baselines,
    run_target_baselines, BaselineError, BaselinePredictor, BaselineScores,
};
pub use config::{pipeline_config_from_env, ConfigError, PipelineConfig, PipelinePaths};
pub use features::{
    build_feature_schema, build_features, calendar_features, read_features, run_feature_build,
    write_features, FeatureBuildReport, FeatureColumn, FeatureConfig, FeatureDType, FeatureError,
    FeatureRow, FeatureSchema, RollingAlignment, FEATURE_SCHEMA_VERSION,
};
pub use metrics::{score, score_aligned, ForecastScore, ScoreError};
pub use model::{
    build_training_set, run_model_training, time_split, train_and_evaluate, GbConfig,
    GradientBoostingRegressor, ModelError, Regressor, TrainReport, TrainingSet, TrainingTarget,
    DEFAULT_TEST_RATIO,
};
pub use monitor::{
    monitor_series, run_drift_monitor, write_monitoring, DriftStatus, MonitorConfig,
    MonitorError, MonitorReport, MonitorRow, MonitorThresholds, MONITOR_COLUMNS,
};
pub use observability::{init_logging, LogFormat, LoggingConfig, LoggingInitError, StageRun};
pub use qa::{
    audit_daily_counts, run_qa_audit, CountSummary, QaError, QaReport,
    MAX_REPORTED_MISSING_DATES,
};
pub use repair::{repair_calendar, run_calendar_repair, FillPolicy, RepairError, RepairReport};
pub use series::{
    parse_calendar_date, read_daily_counts, write_daily_counts, DailyCount, DailySeries,
    SeriesError, COUNT_COLUMN, DATE_COLUMN,
};
pub use target::{
    build_targets, join_by_date, read_targets, run_target_build, write_targets, TargetError,
    TargetRow, DEFAULT_TARGET_HORIZON_DAYS, TARGET_COLUMN,
};
pub use window::{HistoryRequirement, WindowEnd};
