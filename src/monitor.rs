//! Drift monitoring of the persistence forecast of the trailing 7-day mean.
//!
//! Per row: `y_true_7day` is the trailing mean including the current day,
//! `y_pred` is the previous row's `y_true_7day`, and `rolling_mae` is the
//! trailing mean of `abs_error` over a window that must be fully defined.
//! The latest defined `rolling_mae` is classified against multiples of the
//! whole-history MAE.

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::series::{read_daily_counts, write_csv_atomic, DailySeries, SeriesError};
use crate::window::{
    mean, shift_partial, trailing_mean, trailing_mean_partial, HistoryRequirement, WindowEnd,
};

pub const MONITOR_COLUMNS: [&str; 7] = [
    "date",
    "requests",
    "y_true_7day",
    "y_pred",
    "abs_error",
    "rolling_mae",
    "status",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub target_window: usize,
    pub rolling_mae_window: usize,
    pub ok_multiplier: f64,
    pub warn_multiplier: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_window: 7,
            rolling_mae_window: 28,
            ok_multiplier: 1.15,
            warn_multiplier: 1.35,
        }
    }
}

impl MonitorConfig {
    /// Rows before the first one that can carry a classified status.
    pub fn min_history(&self) -> HistoryRequirement {
        HistoryRequirement::lookback(self.target_window + self.rolling_mae_window - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftStatus {
    #[serde(rename = "NA")]
    Na,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ALERT")]
    Alert,
}

impl DriftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Na => "NA",
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Alert => "ALERT",
        }
    }
}

impl fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorThresholds {
    pub baseline_mae: f64,
    pub ok_multiplier: f64,
    pub warn_multiplier: f64,
    /// `baseline_mae * ok_multiplier`, for display only.
    pub ok: f64,
    /// `baseline_mae * warn_multiplier`, for display only.
    pub warn: f64,
}

impl MonitorThresholds {
    pub fn from_baseline(baseline_mae: f64, cfg: &MonitorConfig) -> Self {
        Self {
            baseline_mae,
            ok_multiplier: cfg.ok_multiplier,
            warn_multiplier: cfg.warn_multiplier,
            ok: baseline_mae * cfg.ok_multiplier,
            warn: baseline_mae * cfg.warn_multiplier,
        }
    }

    /// Stateless: the same `rolling_mae` always maps to the same status.
    ///
    /// Compares the ratio `rolling_mae / baseline_mae` with the multipliers,
    /// so a MAE of exactly `1.15 * baseline` is still OK. A zero baseline
    /// leaves only a zero MAE as OK.
    pub fn classify(&self, rolling_mae: Option<f64>) -> DriftStatus {
        let mae = match rolling_mae {
            Some(mae) if !mae.is_nan() => mae,
            _ => return DriftStatus::Na,
        };
        if self.baseline_mae <= 0.0 {
            return if mae <= 0.0 {
                DriftStatus::Ok
            } else {
                DriftStatus::Alert
            };
        }

        let ratio = mae / self.baseline_mae;
        if ratio <= self.ok_multiplier {
            DriftStatus::Ok
        } else if ratio <= self.warn_multiplier {
            DriftStatus::Warn
        } else {
            DriftStatus::Alert
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorRow {
    pub date: NaiveDate,
    pub requests: u64,
    pub y_true_7day: Option<f64>,
    pub y_pred: Option<f64>,
    pub abs_error: Option<f64>,
    pub rolling_mae: Option<f64>,
    pub status: DriftStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub rows: Vec<MonitorRow>,
    /// `None` when no absolute error is defined at all.
    pub thresholds: Option<MonitorThresholds>,
}

impl MonitorReport {
    /// The most recent row with a defined rolling MAE.
    pub fn latest(&self) -> Option<&MonitorRow> {
        self.rows.iter().rev().find(|row| row.rolling_mae.is_some())
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),
    #[error("daily series is not contiguous: {missing} is missing")]
    NonContiguous { missing: NaiveDate },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

pub fn monitor_series(
    series: &DailySeries,
    cfg: &MonitorConfig,
) -> Result<MonitorReport, MonitorError> {
    validate_config(cfg)?;
    if let Some(missing) = series.missing_dates().first() {
        return Err(MonitorError::NonContiguous { missing: *missing });
    }

    let counts = series.counts();
    let y_true = trailing_mean(&counts, cfg.target_window, WindowEnd::Inclusive);
    let y_pred = shift_partial(&y_true);
    let abs_error: Vec<Option<f64>> = y_true
        .iter()
        .zip(&y_pred)
        .map(|(t, p)| match (t, p) {
            (Some(t), Some(p)) => Some((t - p).abs()),
            _ => None,
        })
        .collect();
    let rolling_mae = trailing_mean_partial(&abs_error, cfg.rolling_mae_window);

    let defined_errors: Vec<f64> = abs_error.iter().flatten().copied().collect();
    let thresholds = if defined_errors.is_empty() {
        None
    } else {
        Some(MonitorThresholds::from_baseline(mean(&defined_errors), cfg))
    };

    let rows: Vec<MonitorRow> = series
        .points()
        .iter()
        .enumerate()
        .map(|(idx, point)| MonitorRow {
            date: point.date,
            requests: point.count,
            y_true_7day: y_true[idx],
            y_pred: y_pred[idx],
            abs_error: abs_error[idx],
            rolling_mae: rolling_mae[idx],
            status: thresholds
                .map(|t| t.classify(rolling_mae[idx]))
                .unwrap_or(DriftStatus::Na),
        })
        .collect();

    let report = MonitorReport { rows, thresholds };
    match (report.latest(), report.thresholds) {
        (Some(latest), Some(thresholds)) => info!(
            component = "monitor",
            event = "monitor.latest",
            date = %latest.date,
            rolling_mae = latest.rolling_mae,
            status = latest.status.as_str(),
            baseline_mae = thresholds.baseline_mae,
            ok_threshold = thresholds.ok,
            warn_threshold = thresholds.warn
        ),
        _ => warn!(
            component = "monitor",
            event = "monitor.insufficient_history",
            rows = series.len(),
            min_history_days = cfg.min_history().lookback
        ),
    }

    Ok(report)
}

pub fn write_monitoring(path: &Path, rows: &[MonitorRow]) -> Result<(), MonitorError> {
    write_csv_atomic(path, &MONITOR_COLUMNS, rows)?;
    Ok(())
}

pub fn run_drift_monitor(cfg: &PipelineConfig) -> Result<MonitorReport, MonitorError> {
    let rows = read_daily_counts(&cfg.paths.filled_counts)?;
    let (series, _) = DailySeries::from_unsorted(rows);
    let report = monitor_series(&series, &cfg.monitor)?;
    write_monitoring(&cfg.paths.monitoring, &report.rows)?;
    Ok(report)
}

fn validate_config(cfg: &MonitorConfig) -> Result<(), MonitorError> {
    if cfg.target_window == 0 || cfg.rolling_mae_window == 0 {
        return Err(MonitorError::InvalidConfig(
            "windows must be > 0".to_string(),
        ));
    }
    if !(cfg.ok_multiplier.is_finite() && cfg.warn_multiplier.is_finite()) {
        return Err(MonitorError::InvalidConfig(
            "multipliers must be finite".to_string(),
        ));
    }
    if cfg.ok_multiplier > cfg.warn_multiplier {
        return Err(MonitorError::InvalidConfig(
            "ok_multiplier must not exceed warn_multiplier".to_string(),
        ));
    }
    Ok(())
}
