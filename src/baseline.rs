//! Naive and rolling-mean reference forecasts scored against a target column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::features::{read_features, FeatureError, FeatureRow, FeatureSchema};
use crate::metrics::{score_aligned, ForecastScore, ScoreError};
use crate::target::{read_targets, TargetError, TargetRow};
use crate::window::{trailing_mean, WindowEnd};

const ROLLING_BASELINE_WINDOW: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BaselinePredictor {
    NaiveLag1,
    RollingMean7,
}

impl BaselinePredictor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NaiveLag1 => "naive_lag_1",
            Self::RollingMean7 => "rolling_mean_7",
        }
    }
}

pub type BaselineScores = BTreeMap<BaselinePredictor, ForecastScore>;

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("feature schema has no column '{0}'")]
    MissingColumn(String),
    #[error("baseline {predictor} could not be scored: {source}")]
    Score {
        predictor: &'static str,
        #[source]
        source: ScoreError,
    },
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Next-day framing: truth is the day's count, forecasts are `lag_1` and `roll_mean_7`.
pub fn evaluate_feature_baselines(
    schema: &FeatureSchema,
    rows: &[FeatureRow],
) -> Result<BaselineScores, BaselineError> {
    let lag_idx = feature_column(schema, "lag_1")?;
    let roll_idx = feature_column(schema, "roll_mean_7")?;

    let truth: Vec<Option<f64>> = rows.iter().map(|r| Some(r.count as f64)).collect();
    let predictions = [
        (
            BaselinePredictor::NaiveLag1,
            rows.iter().map(|r| r.values.get(lag_idx).copied()).collect(),
        ),
        (
            BaselinePredictor::RollingMean7,
            rows.iter().map(|r| r.values.get(roll_idx).copied()).collect(),
        ),
    ];

    score_all("features", &truth, predictions)
}

/// Next-week framing: truth is `target_7day_avg`, forecasts are the current
/// day's count and the trailing 7-day mean including the current day.
pub fn evaluate_target_baselines(rows: &[TargetRow]) -> Result<BaselineScores, BaselineError> {
    let counts: Vec<f64> = rows.iter().map(|r| r.count as f64).collect();
    let truth: Vec<Option<f64>> = rows.iter().map(|r| Some(r.target)).collect();
    let predictions = [
        (
            BaselinePredictor::NaiveLag1,
            counts.iter().copied().map(Some).collect(),
        ),
        (
            BaselinePredictor::RollingMean7,
            trailing_mean(&counts, ROLLING_BASELINE_WINDOW, WindowEnd::Inclusive),
        ),
    ];

    score_all("target_7day", &truth, predictions)
}

pub fn run_feature_baselines(cfg: &PipelineConfig) -> Result<BaselineScores, BaselineError> {
    let (schema, rows) = read_features(&cfg.paths.features, &cfg.features)?;
    evaluate_feature_baselines(&schema, &rows)
}

pub fn run_target_baselines(cfg: &PipelineConfig) -> Result<BaselineScores, BaselineError> {
    let rows = read_targets(&cfg.paths.target)?;
    evaluate_target_baselines(&rows)
}

fn score_all(
    framing: &str,
    truth: &[Option<f64>],
    predictions: [(BaselinePredictor, Vec<Option<f64>>); 2],
) -> Result<BaselineScores, BaselineError> {
    let mut scores = BTreeMap::new();
    for (predictor, predicted) in predictions {
        let score = score_aligned(truth, &predicted).map_err(|source| BaselineError::Score {
            predictor: predictor.as_str(),
            source,
        })?;
        info!(
            component = "baseline",
            event = "baseline.scored",
            framing,
            predictor = predictor.as_str(),
            mae = score.mae,
            rmse = score.rmse,
            n = score.n
        );
        scores.insert(predictor, score);
    }
    Ok(scores)
}

fn feature_column(schema: &FeatureSchema, name: &str) -> Result<usize, BaselineError> {
    schema
        .column_index(name)
        .ok_or_else(|| BaselineError::MissingColumn(name.to_string()))
}
