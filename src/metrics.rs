//! Point-forecast accuracy scores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastScore {
    pub mae: f64,
    pub rmse: f64,
    /// Pairs that entered the score after alignment.
    pub n: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("truth and prediction lengths differ: {truth} vs {predicted}")]
    LengthMismatch { truth: usize, predicted: usize },
    #[error("no aligned (truth, prediction) pairs to score")]
    Empty,
}

/// Scores two equally long series of complete values.
pub fn score(truth: &[f64], predicted: &[f64]) -> Result<ForecastScore, ScoreError> {
    if truth.len() != predicted.len() {
        return Err(ScoreError::LengthMismatch {
            truth: truth.len(),
            predicted: predicted.len(),
        });
    }
    if truth.is_empty() {
        return Err(ScoreError::Empty);
    }

    let n = truth.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    for (t, p) in truth.iter().zip(predicted) {
        let err = t - p;
        abs_sum += err.abs();
        sq_sum += err * err;
    }

    Ok(ForecastScore {
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        n: truth.len(),
    })
}

/// Drops every position where either side is undefined or non-finite, then scores.
pub fn score_aligned(
    truth: &[Option<f64>],
    predicted: &[Option<f64>],
) -> Result<ForecastScore, ScoreError> {
    if truth.len() != predicted.len() {
        return Err(ScoreError::LengthMismatch {
            truth: truth.len(),
            predicted: predicted.len(),
        });
    }

    let (aligned_truth, aligned_pred): (Vec<f64>, Vec<f64>) = truth
        .iter()
        .zip(predicted)
        .filter_map(|pair| match pair {
            (Some(t), Some(p)) if t.is_finite() && p.is_finite() => Some((*t, *p)),
            _ => None,
        })
        .unzip();

    score(&aligned_truth, &aligned_pred)
}
