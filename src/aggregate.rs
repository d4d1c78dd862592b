//! Collapse raw service-request records into one count per calendar day.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::series::{
    open_csv, parse_date_field, require_column, write_daily_counts, DailyCount, DailySeries,
    SeriesError,
};

pub const DEFAULT_TIMESTAMP_COLUMN: &str = "created_date";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no request records found in {0}")]
    NoRecords(String),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Counts records per date of `timestamp_column`.
pub fn aggregate_records<I>(
    records: I,
    timestamp_idx: usize,
    timestamp_column: &str,
) -> Result<DailySeries, AggregateError>
where
    I: IntoIterator<Item = Result<StringRecord, csv::Error>>,
{
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for record in records {
        let record = record?;
        let date = parse_date_field(&record, timestamp_idx, timestamp_column)?;
        *per_day.entry(date).or_insert(0) += 1;
    }

    let points = per_day
        .into_iter()
        .map(|(date, count)| DailyCount::new(date, count))
        .collect();
    Ok(DailySeries::from_sorted(points)?)
}

pub fn aggregate_file(path: &Path, timestamp_column: &str) -> Result<DailySeries, AggregateError> {
    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();
    let timestamp_idx = require_column(&headers, timestamp_column, path)?;

    let series = aggregate_records(reader.records(), timestamp_idx, timestamp_column)?;
    if series.is_empty() {
        return Err(AggregateError::NoRecords(path.display().to_string()));
    }

    let total: u64 = series.points().iter().map(|p| p.count).sum();
    info!(
        component = "aggregate",
        event = "aggregate.finish",
        path = %path.display(),
        records = total,
        days = series.len()
    );

    Ok(series)
}

pub fn run_daily_aggregation(cfg: &PipelineConfig) -> Result<DailySeries, AggregateError> {
    let series = aggregate_file(&cfg.paths.raw_requests, &cfg.timestamp_column)?;
    write_daily_counts(&cfg.paths.daily_counts, &series)?;
    Ok(series)
}
