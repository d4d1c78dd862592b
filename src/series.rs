//! Daily request-count series and the CSV plumbing every stage shares.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DATE_COLUMN: &str = "date";
pub const COUNT_COLUMN: &str = "daily_request_count";

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    #[serde(rename = "daily_request_count")]
    pub count: u64,
}

impl DailyCount {
    pub fn new(date: NaiveDate, count: u64) -> Self {
        Self { date, count }
    }
}

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("required input not found: {path}")]
    MissingInput { path: PathBuf },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error("failed to parse field {field} value '{value}' on line {line}")]
    ParseField {
        field: String,
        line: u64,
        value: String,
    },
    #[error("invalid output path: {0}")]
    InvalidOutputPath(PathBuf),
    #[error("dates must be strictly increasing: {previous} followed by {next}")]
    Unordered { previous: NaiveDate, next: NaiveDate },
}

/// Chronologically ordered daily counts with unique dates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DailySeries {
    points: Vec<DailyCount>,
}

impl DailySeries {
    /// Builds a series from rows that are already strictly increasing by date.
    pub fn from_sorted(points: Vec<DailyCount>) -> Result<Self, SeriesError> {
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SeriesError::Unordered {
                    previous: pair[0].date,
                    next: pair[1].date,
                });
            }
        }
        Ok(Self { points })
    }

    /// Sorts by date and keeps the first occurrence of each date.
    ///
    /// Returns the series together with the number of rows dropped as duplicates.
    pub fn from_unsorted(mut rows: Vec<DailyCount>) -> (Self, u64) {
        rows.sort_by_key(|row| row.date);

        let mut points: Vec<DailyCount> = Vec::with_capacity(rows.len());
        let mut duplicates_removed = 0u64;
        for row in rows {
            if points
                .last()
                .map(|existing| existing.date == row.date)
                .unwrap_or(false)
            {
                duplicates_removed += 1;
            } else {
                points.push(row);
            }
        }

        if duplicates_removed > 0 {
            warn!(
                component = "series",
                event = "series.duplicates_removed",
                duplicates_removed
            );
        }

        (Self { points }, duplicates_removed)
    }

    pub fn points(&self) -> &[DailyCount] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn counts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.count as f64).collect()
    }

    pub fn is_contiguous(&self) -> bool {
        self.points
            .windows(2)
            .all(|pair| pair[0].date.succ_opt() == Some(pair[1].date))
    }

    /// Dates between the first and last observation that have no row, ascending.
    pub fn missing_dates(&self) -> Vec<NaiveDate> {
        let mut missing = Vec::new();
        for pair in self.points.windows(2) {
            let mut cursor = pair[0].date;
            while let Some(next) = cursor.checked_add_days(Days::new(1)) {
                if next >= pair[1].date {
                    break;
                }
                missing.push(next);
                cursor = next;
            }
        }
        missing
    }

    pub fn into_points(self) -> Vec<DailyCount> {
        self.points
    }
}

/// Reads `date,daily_request_count` rows in file order.
pub fn read_daily_counts(path: &Path) -> Result<Vec<DailyCount>, SeriesError> {
    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();
    let date_idx = require_column(&headers, DATE_COLUMN, path)?;
    let count_idx = require_column(&headers, COUNT_COLUMN, path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(DailyCount {
            date: parse_date_field(&record, date_idx, DATE_COLUMN)?,
            count: parse_count_field(&record, count_idx, COUNT_COLUMN)?,
        });
    }

    info!(
        component = "series",
        event = "series.read",
        path = %path.display(),
        rows = rows.len()
    );

    Ok(rows)
}

pub fn write_daily_counts(path: &Path, series: &DailySeries) -> Result<(), SeriesError> {
    write_csv_atomic(path, &[DATE_COLUMN, COUNT_COLUMN], series.points())
}

/// Opens a headed CSV file, failing with [`SeriesError::MissingInput`] when absent.
pub fn open_csv(path: &Path) -> Result<csv::Reader<fs::File>, SeriesError> {
    if !path.exists() {
        return Err(SeriesError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

pub fn require_column(
    headers: &StringRecord,
    column: &str,
    path: &Path,
) -> Result<usize, SeriesError> {
    headers
        .iter()
        .position(|name| name == column)
        .ok_or_else(|| SeriesError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })
}

pub fn parse_date_field(
    record: &StringRecord,
    idx: usize,
    field: &str,
) -> Result<NaiveDate, SeriesError> {
    let raw = record.get(idx).unwrap_or_default();
    parse_calendar_date(raw).ok_or_else(|| parse_error(record, field, raw))
}

/// Counts are integers; integral floats such as `12.0` are accepted as well.
pub fn parse_count_field(
    record: &StringRecord,
    idx: usize,
    field: &str,
) -> Result<u64, SeriesError> {
    let raw = record.get(idx).unwrap_or_default();
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 => {
            Ok(value as u64)
        }
        _ => Err(parse_error(record, field, raw)),
    }
}

pub fn parse_f64_field(
    record: &StringRecord,
    idx: usize,
    field: &str,
) -> Result<f64, SeriesError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| parse_error(record, field, raw))
}

/// Calendar date of a date or timestamp string; the time of day is discarded.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.date());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.naive_local().date())
}

/// Writes a header plus serialized rows to `<path>.tmp`, then renames into place.
pub fn write_csv_atomic<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: &[T],
) -> Result<(), SeriesError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|err| {
        SeriesError::Io(std::io::Error::new(
            err.error().kind(),
            err.error().to_string(),
        ))
    })?;
    write_atomic(path, &bytes)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SeriesError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| SeriesError::InvalidOutputPath(path.to_path_buf()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

fn parse_error(record: &StringRecord, field: &str, raw: &str) -> SeriesError {
    SeriesError::ParseField {
        field: field.to_string(),
        line: record.position().map(|pos| pos.line()).unwrap_or(0),
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn calendar_date_accepts_common_timestamp_shapes() {
        assert_eq!(parse_calendar_date("2023-01-05"), Some(d(2023, 1, 5)));
        assert_eq!(
            parse_calendar_date("2023-01-05T23:59:59.000"),
            Some(d(2023, 1, 5))
        );
        assert_eq!(
            parse_calendar_date("2023-01-05 00:00:00"),
            Some(d(2023, 1, 5))
        );
        assert_eq!(
            parse_calendar_date("01/05/2023 11:15:00 PM"),
            Some(d(2023, 1, 5))
        );
        assert_eq!(parse_calendar_date("not-a-date"), None);
        assert_eq!(parse_calendar_date(""), None);
    }

    #[test]
    fn unsorted_rows_are_sorted_and_first_duplicate_wins() {
        let (series, removed) = DailySeries::from_unsorted(vec![
            DailyCount::new(d(2023, 1, 3), 3),
            DailyCount::new(d(2023, 1, 1), 1),
            DailyCount::new(d(2023, 1, 3), 99),
        ]);

        assert_eq!(removed, 1);
        assert_eq!(
            series.points(),
            &[
                DailyCount::new(d(2023, 1, 1), 1),
                DailyCount::new(d(2023, 1, 3), 3)
            ]
        );
        assert!(!series.is_contiguous());
        assert_eq!(series.missing_dates(), vec![d(2023, 1, 2)]);
    }

    #[test]
    fn from_sorted_rejects_repeated_dates() {
        let err = DailySeries::from_sorted(vec![
            DailyCount::new(d(2023, 1, 1), 1),
            DailyCount::new(d(2023, 1, 1), 2),
        ])
        .expect_err("repeated date should be rejected");
        assert!(matches!(err, SeriesError::Unordered { .. }));
    }
}
