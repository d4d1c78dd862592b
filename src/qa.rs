//! Read-only data-quality audit of the daily counts before repair.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::series::{read_daily_counts, write_atomic, DailyCount, DailySeries, SeriesError};
use crate::window::{mean, sample_std};

pub const MAX_REPORTED_MISSING_DATES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` for a single row.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub total_rows: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub duplicate_dates: usize,
    pub summary: CountSummary,
    /// Every absent date in `[first_date, last_date]`, ascending.
    pub missing_dates: Vec<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("cannot audit an empty series")]
    EmptySeries,
    #[error(transparent)]
    Series(#[from] SeriesError),
}

pub fn audit_daily_counts(rows: &[DailyCount]) -> Result<QaReport, QaError> {
    if rows.is_empty() {
        return Err(QaError::EmptySeries);
    }

    let unique: BTreeSet<NaiveDate> = rows.iter().map(|row| row.date).collect();
    let duplicate_dates = rows.len() - unique.len();
    let (series, _) = DailySeries::from_unsorted(rows.to_vec());
    let (Some(first_date), Some(last_date)) = (series.first_date(), series.last_date()) else {
        return Err(QaError::EmptySeries);
    };

    let counts: Vec<f64> = rows.iter().map(|row| row.count as f64).collect();
    let report = QaReport {
        total_rows: rows.len(),
        first_date,
        last_date,
        duplicate_dates,
        summary: summarize(&counts),
        missing_dates: series.missing_dates(),
    };

    if report.duplicate_dates > 0 || !report.missing_dates.is_empty() {
        warn!(
            component = "qa",
            event = "qa.issues_found",
            duplicate_dates = report.duplicate_dates,
            missing_dates = report.missing_dates.len()
        );
    }
    info!(
        component = "qa",
        event = "qa.audit.finish",
        total_rows = report.total_rows,
        first_date = %report.first_date,
        last_date = %report.last_date
    );

    Ok(report)
}

impl QaReport {
    pub fn render(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        let _ = writeln!(out, "Total days: {}", self.total_rows);
        let _ = writeln!(out, "Date range: {} → {}", self.first_date, self.last_date);
        let _ = writeln!(out, "Duplicate dates: {}", self.duplicate_dates);
        let _ = writeln!(out);
        let _ = writeln!(out, "Daily request count summary:");
        let _ = writeln!(out, "count {:>14}", s.count);
        let _ = writeln!(out, "mean  {:>14.6}", s.mean);
        match s.std {
            Some(std) => {
                let _ = writeln!(out, "std   {std:>14.6}");
            }
            None => {
                let _ = writeln!(out, "std   {:>14}", "NaN");
            }
        }
        let _ = writeln!(out, "min   {:>14.6}", s.min);
        let _ = writeln!(out, "25%   {:>14.6}", s.q25);
        let _ = writeln!(out, "50%   {:>14.6}", s.median);
        let _ = writeln!(out, "75%   {:>14.6}", s.q75);
        let _ = writeln!(out, "max   {:>14.6}", s.max);
        let _ = writeln!(out);
        let _ = writeln!(out, "Missing days: {}", self.missing_dates.len());
        if !self.missing_dates.is_empty() {
            let _ = writeln!(
                out,
                "First {} missing dates:",
                MAX_REPORTED_MISSING_DATES
            );
            for date in self.missing_dates.iter().take(MAX_REPORTED_MISSING_DATES) {
                let _ = writeln!(out, "{date}");
            }
        }
        out
    }
}

pub fn run_qa_audit(cfg: &PipelineConfig) -> Result<QaReport, QaError> {
    let rows = read_daily_counts(&cfg.paths.daily_counts)?;
    let report = audit_daily_counts(&rows)?;
    write_atomic(&cfg.paths.qa_report, report.render().as_bytes())?;
    Ok(report)
}

fn summarize(values: &[f64]) -> CountSummary {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    CountSummary {
        count: values.len(),
        mean: mean(values),
        std: sample_std(values),
        min: sorted[0],
        q25: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q75: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    }
}

/// Linear interpolation between closest ranks of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.75), 3.25);
        assert_eq!(quantile(&[7.0], 0.5), 7.0);
    }
}
