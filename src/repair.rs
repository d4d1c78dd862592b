//! Calendar repair: reindex a daily series onto a gap-free calendar.

use std::path::Path;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::series::{read_daily_counts, write_daily_counts, DailyCount, DailySeries, SeriesError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPolicy {
    /// A missing day had no requests.
    ZeroFill,
    /// Linear in time between the nearest known days, rounded half-to-even.
    Interpolate,
}

impl FillPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZeroFill => "zero",
            Self::Interpolate => "interpolate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zero" | "zero_fill" | "zerofill" => Some(Self::ZeroFill),
            "interpolate" | "interpolation" | "time" => Some(Self::Interpolate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub input_days: u64,
    pub output_days: u64,
    pub filled_days: u64,
    pub duplicates_removed: u64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("cannot repair an empty series: no date range to rebuild")]
    EmptySeries,
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Fills every calendar day between the first and last observation.
pub fn repair_calendar(
    rows: Vec<DailyCount>,
    policy: FillPolicy,
) -> Result<(DailySeries, RepairReport), RepairError> {
    let (series, duplicates_removed) = DailySeries::from_unsorted(rows);
    let input_days = series.len() as u64;
    let (Some(first_date), Some(last_date)) = (series.first_date(), series.last_date()) else {
        return Err(RepairError::EmptySeries);
    };

    let known = series.into_points();
    let mut filled = Vec::with_capacity(known.len());
    let mut filled_days = 0u64;

    for (idx, point) in known.iter().enumerate() {
        filled.push(*point);
        let Some(next) = known.get(idx + 1) else {
            break;
        };

        let span = (next.date - point.date).num_days();
        let mut offset = 1i64;
        let mut cursor = point.date;
        while let Some(date) = cursor.checked_add_days(Days::new(1)) {
            if date >= next.date {
                break;
            }
            let count = match policy {
                FillPolicy::ZeroFill => 0,
                FillPolicy::Interpolate => interpolate(point.count, next.count, offset, span),
            };
            filled.push(DailyCount::new(date, count));
            filled_days += 1;
            offset += 1;
            cursor = date;
        }
    }

    let repaired = DailySeries::from_sorted(filled)?;
    let report = RepairReport {
        input_days,
        output_days: repaired.len() as u64,
        filled_days,
        duplicates_removed,
        first_date,
        last_date,
    };

    info!(
        component = "repair",
        event = "repair.finish",
        policy = policy.as_str(),
        input_days = report.input_days,
        output_days = report.output_days,
        filled_days = report.filled_days,
        duplicates_removed = report.duplicates_removed
    );

    Ok((repaired, report))
}

pub fn run_calendar_repair(cfg: &PipelineConfig) -> Result<RepairReport, RepairError> {
    let rows = read_daily_counts(&cfg.paths.daily_counts)?;
    let (repaired, report) = repair_calendar(rows, cfg.fill_policy)?;
    write_repaired(&cfg.paths.filled_counts, &repaired)?;
    Ok(report)
}

fn write_repaired(path: &Path, series: &DailySeries) -> Result<(), RepairError> {
    write_daily_counts(path, series)?;
    info!(
        component = "repair",
        event = "repair.written",
        path = %path.display(),
        rows = series.len()
    );
    Ok(())
}

fn interpolate(left: u64, right: u64, offset: i64, span: i64) -> u64 {
    let fraction = offset as f64 / span as f64;
    let value = left as f64 + (right as f64 - left as f64) * fraction;
    value.round_ties_even().max(0.0) as u64
}
