//! Chronological train/test evaluation of a trainable regressor, plus the
//! gradient-boosted tree regressor the pipeline trains by default.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::features::{read_features, FeatureError, FeatureRow, FeatureSchema};
use crate::metrics::{score, ForecastScore, ScoreError};
use crate::target::{join_by_date, read_targets, TargetError, TargetRow};
use crate::window::mean;

pub const DEFAULT_TEST_RATIO: f64 = 0.2;

/// Anything that can learn `features -> target` and predict for new rows.
pub trait Regressor {
    fn fit(&mut self, features: &[Vec<f64>], target: &[f64]) -> Result<(), ModelError>;

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingTarget {
    /// The day's own count.
    DailyCount,
    /// `target_7day_avg`, joined by date from the target file.
    ForwardAverage,
}

impl TrainingTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailyCount => "daily_count",
            Self::ForwardAverage => "forward_average",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily_count" | "daily_request_count" => Some(Self::DailyCount),
            "forward_average" | "target_7day_avg" => Some(Self::ForwardAverage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows each tree is fit on; `1.0` uses every row.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GbConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            dates: self.dates[range.clone()].to_vec(),
            features: self.features[range.clone()].to_vec(),
            target: self.target[range].to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub model: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub score: ForecastScore,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model config: {0}")]
    InvalidConfig(String),
    #[error("invalid train/test split: {0}")]
    InvalidSplit(String),
    #[error("expected {expected} feature values per row, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("model must be fit before predicting")]
    NotFitted,
    #[error("training target {0} requires target rows")]
    MissingTargets(&'static str),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Assembles the feature matrix (every schema column) and the chosen target,
/// ordered by date.
pub fn build_training_set(
    schema: &FeatureSchema,
    rows: &[FeatureRow],
    target: TrainingTarget,
    targets: Option<&[TargetRow]>,
) -> Result<TrainingSet, ModelError> {
    let mut pairs: Vec<(&FeatureRow, f64)> = match target {
        TrainingTarget::DailyCount => rows.iter().map(|r| (r, r.count as f64)).collect(),
        TrainingTarget::ForwardAverage => {
            let targets = targets.ok_or(ModelError::MissingTargets(target.as_str()))?;
            join_by_date(rows, targets)
        }
    };
    pairs.sort_by_key(|(row, _)| row.date);

    let width = schema.columns.len();
    let mut set = TrainingSet {
        feature_names: schema.columns.iter().map(|c| c.name.clone()).collect(),
        dates: Vec::with_capacity(pairs.len()),
        features: Vec::with_capacity(pairs.len()),
        target: Vec::with_capacity(pairs.len()),
    };
    for (row, y) in pairs {
        if row.values.len() != width {
            return Err(ModelError::DimensionMismatch {
                expected: width,
                got: row.values.len(),
            });
        }
        set.dates.push(row.date);
        set.features.push(row.values.clone());
        set.target.push(y);
    }

    Ok(set)
}

/// Oldest `1 - test_ratio` of rows train, the most recent rows test. No shuffling.
pub fn time_split(
    set: &TrainingSet,
    test_ratio: f64,
) -> Result<(TrainingSet, TrainingSet), ModelError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(ModelError::InvalidSplit(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }
    let n = set.len();
    let split = (n as f64 * (1.0 - test_ratio)).floor() as usize;
    if split == 0 || split >= n {
        return Err(ModelError::InvalidSplit(format!(
            "{n} rows cannot be split with test_ratio {test_ratio}"
        )));
    }
    Ok((set.slice(0..split), set.slice(split..n)))
}

/// Fits on the chronological training split and scores on the held-out tail only.
pub fn train_and_evaluate<R: Regressor + ?Sized>(
    model: &mut R,
    set: &TrainingSet,
    test_ratio: f64,
) -> Result<TrainReport, ModelError> {
    let (train, test) = time_split(set, test_ratio)?;

    info!(
        component = "model",
        event = "model.train.start",
        model = model.name(),
        train_rows = train.len(),
        test_rows = test.len(),
        feature_count = set.feature_names.len()
    );

    model.fit(&train.features, &train.target)?;
    let predictions = model.predict(&test.features)?;
    let score = score(&test.target, &predictions)?;

    let (Some(test_start), Some(test_end)) = (test.dates.first(), test.dates.last()) else {
        return Err(ModelError::InvalidSplit("empty test split".to_string()));
    };
    let report = TrainReport {
        model: model.name().to_string(),
        train_rows: train.len(),
        test_rows: test.len(),
        test_start: *test_start,
        test_end: *test_end,
        score,
    };

    info!(
        component = "model",
        event = "model.train.finish",
        model = model.name(),
        mae = report.score.mae,
        rmse = report.score.rmse,
        test_start = %report.test_start,
        test_end = %report.test_end
    );

    Ok(report)
}

pub fn run_model_training(cfg: &PipelineConfig) -> Result<TrainReport, ModelError> {
    let (schema, rows) = read_features(&cfg.paths.features, &cfg.features)?;
    let targets = match cfg.training_target {
        TrainingTarget::DailyCount => None,
        TrainingTarget::ForwardAverage => Some(read_targets(&cfg.paths.target)?),
    };
    let set = build_training_set(&schema, &rows, cfg.training_target, targets.as_deref())?;
    let mut model = GradientBoostingRegressor::new(cfg.model.clone());
    train_and_evaluate(&mut model, &set, cfg.test_ratio)
}

/// Squared-error gradient boosting over depth-limited regression trees.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostingRegressor {
    config: GbConfig,
    initial: f64,
    trees: Vec<RegressionTree>,
    n_features: Option<usize>,
}

impl GradientBoostingRegressor {
    pub fn new(config: GbConfig) -> Self {
        Self {
            config,
            initial: 0.0,
            trees: Vec::new(),
            n_features: None,
        }
    }

    pub fn config(&self) -> &GbConfig {
        &self.config
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<(), ModelError> {
        let cfg = &self.config;
        if cfg.n_estimators == 0 {
            return Err(ModelError::InvalidConfig(
                "n_estimators must be > 0".to_string(),
            ));
        }
        if !(cfg.learning_rate.is_finite() && cfg.learning_rate > 0.0) {
            return Err(ModelError::InvalidConfig(
                "learning_rate must be a positive finite number".to_string(),
            ));
        }
        if cfg.max_depth == 0 {
            return Err(ModelError::InvalidConfig("max_depth must be > 0".to_string()));
        }
        if cfg.min_samples_leaf == 0 {
            return Err(ModelError::InvalidConfig(
                "min_samples_leaf must be > 0".to_string(),
            ));
        }
        if !(cfg.subsample > 0.0 && cfg.subsample <= 1.0) {
            return Err(ModelError::InvalidConfig(
                "subsample must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    fn sample_rows(&self, n: usize, rng: &mut StdRng) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let amount = ((n as f64 * self.config.subsample).round() as usize).clamp(1, n);
        let mut rows = rand::seq::index::sample(rng, n, amount).into_vec();
        rows.sort_unstable();
        rows
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, features: &[Vec<f64>], target: &[f64]) -> Result<(), ModelError> {
        self.validate()?;
        if target.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.len() != target.len() {
            return Err(ModelError::DimensionMismatch {
                expected: target.len(),
                got: features.len(),
            });
        }
        let width = check_width(features, None)?;

        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
        };
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.initial = mean(target);
        self.trees = Vec::with_capacity(self.config.n_estimators);
        let mut current = vec![self.initial; target.len()];

        for stage in 0..self.config.n_estimators {
            let residuals: Vec<f64> = target.iter().zip(&current).map(|(y, f)| y - f).collect();
            let rows = self.sample_rows(target.len(), &mut rng);
            let tree = RegressionTree::fit(features, &residuals, rows, params);
            for (value, row) in current.iter_mut().zip(features) {
                *value += self.config.learning_rate * tree.predict_row(row);
            }
            debug!(
                component = "model",
                event = "model.boost.stage",
                stage,
                nodes = tree.nodes.len()
            );
            self.trees.push(tree);
        }

        self.n_features = Some(width);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let width = self.n_features.ok_or(ModelError::NotFitted)?;
        check_width(features, Some(width))?;
        Ok(features
            .iter()
            .map(|row| {
                self.initial
                    + self
                        .trees
                        .iter()
                        .map(|tree| self.config.learning_rate * tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}

fn check_width(features: &[Vec<f64>], expected: Option<usize>) -> Result<usize, ModelError> {
    let expected = expected.unwrap_or_else(|| features.first().map(Vec::len).unwrap_or(0));
    for row in features {
        if row.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                got: row.len(),
            });
        }
    }
    Ok(expected)
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: usize,
    min_samples_leaf: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// CART regression tree; each leaf predicts the mean target of its rows.
#[derive(Debug, Clone, PartialEq, Default)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(features: &[Vec<f64>], target: &[f64], rows: Vec<usize>, params: TreeParams) -> Self {
        let mut tree = Self::default();
        if !rows.is_empty() {
            tree.grow(features, target, rows, 0, params);
        }
        tree
    }

    fn grow(
        &mut self,
        features: &[Vec<f64>],
        target: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: TreeParams,
    ) -> usize {
        let value = rows.iter().map(|r| target[*r]).sum::<f64>() / rows.len() as f64;
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value });

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf {
            return idx;
        }
        let Some(split) = best_split(features, target, &rows, params.min_samples_leaf) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|r| features[*r][split.feature] <= split.threshold);
        let left = self.grow(features, target, left_rows, depth + 1, params);
        let right = self.grow(features, target, right_rows, depth + 1, params);
        self.nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if x <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }
}

/// Exhaustive search for the split that most reduces squared error.
fn best_split(
    features: &[Vec<f64>],
    target: &[f64],
    rows: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|r| target[*r]).sum();
    let parent = total * total / n as f64;
    let width = rows.first().map(|r| features[*r].len()).unwrap_or(0);

    let mut best: Option<SplitCandidate> = None;
    let mut order = rows.to_vec();
    for feature in 0..width {
        order.sort_by(|a, b| features[*a][feature].total_cmp(&features[*b][feature]));

        let mut left_sum = 0.0;
        for i in 1..n {
            left_sum += target[order[i - 1]];
            if i < min_samples_leaf || n - i < min_samples_leaf {
                continue;
            }
            let lo = features[order[i - 1]][feature];
            let hi = features[order[i]][feature];
            if lo >= hi {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / i as f64 + right_sum * right_sum / (n - i) as f64
                - parent;
            if gain > best.map(|b| b.gain).unwrap_or(1e-12) {
                let mid = lo + (hi - lo) / 2.0;
                best = Some(SplitCandidate {
                    feature,
                    threshold: if mid < hi { mid } else { lo },
                    gain,
                });
            }
        }
    }
    best
}
