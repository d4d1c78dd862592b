//! Forward-looking smoothed target: the mean count over the days after each date.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::features::FeatureRow;
use crate::series::{
    open_csv, parse_count_field, parse_date_field, parse_f64_field, read_daily_counts,
    require_column, write_csv_atomic, DailySeries, SeriesError, COUNT_COLUMN, DATE_COLUMN,
};
use crate::window::{forward_mean, HistoryRequirement};

pub const TARGET_COLUMN: &str = "target_7day_avg";
pub const DEFAULT_TARGET_HORIZON_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRow {
    pub date: NaiveDate,
    #[serde(rename = "daily_request_count")]
    pub count: u64,
    #[serde(rename = "target_7day_avg")]
    pub target: f64,
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("target horizon must be > 0")]
    InvalidHorizon,
    #[error("series is not contiguous: no row for {missing}")]
    NonContiguous { missing: NaiveDate },
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row per date whose full forward window exists.
pub fn build_targets(series: &DailySeries, horizon: usize) -> Result<Vec<TargetRow>, TargetError> {
    if horizon == 0 {
        return Err(TargetError::InvalidHorizon);
    }
    if let Some(missing) = series.missing_dates().first() {
        return Err(TargetError::NonContiguous { missing: *missing });
    }

    let requirement = HistoryRequirement::lookahead(horizon);
    let forward = forward_mean(&series.counts(), horizon);
    let rows: Vec<TargetRow> = series
        .points()
        .iter()
        .zip(forward)
        .enumerate()
        .filter(|(idx, _)| requirement.is_satisfied(*idx, series.len()))
        .filter_map(|(_, (point, target))| {
            target.map(|target| TargetRow {
                date: point.date,
                count: point.count,
                target,
            })
        })
        .collect();

    info!(
        component = "target",
        event = "target.build.finish",
        horizon,
        input_rows = series.len(),
        output_rows = rows.len()
    );

    Ok(rows)
}

/// Pairs each feature row with the target of the same date; dates without a
/// target are skipped.
pub fn join_by_date<'a>(
    features: &'a [FeatureRow],
    targets: &[TargetRow],
) -> Vec<(&'a FeatureRow, f64)> {
    let by_date: BTreeMap<NaiveDate, f64> = targets.iter().map(|t| (t.date, t.target)).collect();
    features
        .iter()
        .filter_map(|row| by_date.get(&row.date).map(|target| (row, *target)))
        .collect()
}

pub fn write_targets(path: &Path, rows: &[TargetRow]) -> Result<(), TargetError> {
    write_csv_atomic(path, &[DATE_COLUMN, COUNT_COLUMN, TARGET_COLUMN], rows)?;
    Ok(())
}

pub fn read_targets(path: &Path) -> Result<Vec<TargetRow>, TargetError> {
    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();
    let date_idx = require_column(&headers, DATE_COLUMN, path)?;
    let count_idx = require_column(&headers, COUNT_COLUMN, path)?;
    let target_idx = require_column(&headers, TARGET_COLUMN, path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(TargetRow {
            date: parse_date_field(&record, date_idx, DATE_COLUMN)?,
            count: parse_count_field(&record, count_idx, COUNT_COLUMN)?,
            target: parse_f64_field(&record, target_idx, TARGET_COLUMN)?,
        });
    }
    rows.sort_by_key(|row| row.date);
    Ok(rows)
}

pub fn run_target_build(cfg: &PipelineConfig) -> Result<Vec<TargetRow>, TargetError> {
    let rows = read_daily_counts(&cfg.paths.filled_counts)?;
    let (series, _) = DailySeries::from_unsorted(rows);
    let targets = build_targets(&series, cfg.target_horizon_days)?;
    write_targets(&cfg.paths.target, &targets)?;
    Ok(targets)
}
