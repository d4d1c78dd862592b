//! Lag, rolling-statistic and calendar features over a repaired daily series.

use std::collections::HashSet;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::series::{
    open_csv, parse_count_field, parse_date_field, parse_f64_field, read_daily_counts,
    write_atomic, DailySeries, SeriesError, COUNT_COLUMN, DATE_COLUMN,
};
use crate::window::{lag, trailing_mean, trailing_std, HistoryRequirement, WindowEnd};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingAlignment {
    /// Window at row `t` covers `t-w ..= t-1`; the current count never feeds its own row.
    ExcludeCurrent,
    /// Window at row `t` covers `t-w+1 ..= t`.
    IncludeCurrent,
}

impl RollingAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExcludeCurrent => "exclude_current",
            Self::IncludeCurrent => "include_current",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exclude_current" | "exclusive" => Some(Self::ExcludeCurrent),
            "include_current" | "inclusive" => Some(Self::IncludeCurrent),
            _ => None,
        }
    }

    /// One-line description for stage summaries.
    pub fn describe(self) -> &'static str {
        match self {
            Self::ExcludeCurrent => {
                "rolling windows end the day before each row \
                 (DEMAND_ROLLING_ALIGNMENT=include_current ends them on the row itself)"
            }
            Self::IncludeCurrent => "rolling windows end on each row's own day",
        }
    }

    fn window_end(self) -> WindowEnd {
        match self {
            Self::ExcludeCurrent => WindowEnd::Exclusive,
            Self::IncludeCurrent => WindowEnd::Inclusive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
    I64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn csv_header(&self) -> Vec<String> {
        let mut header = vec![DATE_COLUMN.to_string(), COUNT_COLUMN.to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub count: u64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub lags: Vec<u32>,
    pub rolling_windows: Vec<u32>,
    pub rolling_alignment: RollingAlignment,
    pub schema_version: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 7, 14],
            rolling_windows: vec![7, 14],
            rolling_alignment: RollingAlignment::ExcludeCurrent,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

impl FeatureConfig {
    /// Rows a series must have before the first feature row exists.
    pub fn min_history(&self) -> HistoryRequirement {
        let end = self.rolling_alignment.window_end();
        let lags = self
            .lags
            .iter()
            .map(|k| HistoryRequirement::lookback(*k as usize));
        let windows = self
            .rolling_windows
            .iter()
            .map(|w| end.requirement(*w as usize));
        lags.chain(windows)
            .fold(HistoryRequirement::default(), HistoryRequirement::max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBuildReport {
    pub input_rows: u64,
    pub output_rows: u64,
    pub dropped_rows: u64,
    pub min_history_days: u64,
    pub rolling_alignment: RollingAlignment,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid feature config: {0}")]
    InvalidConfig(String),
    #[error("series is not contiguous: no row for {missing}")]
    NonContiguous { missing: NaiveDate },
    #[error("feature header mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub fn build_feature_schema(cfg: &FeatureConfig) -> FeatureSchema {
    let mut columns = Vec::new();

    for k in &cfg.lags {
        columns.push(FeatureColumn {
            name: format!("lag_{k}"),
            dtype: FeatureDType::F64,
        });
    }
    for w in &cfg.rolling_windows {
        columns.push(FeatureColumn {
            name: format!("roll_mean_{w}"),
            dtype: FeatureDType::F64,
        });
        columns.push(FeatureColumn {
            name: format!("roll_std_{w}"),
            dtype: FeatureDType::F64,
        });
    }
    columns.push(FeatureColumn {
        name: "day_of_week".to_string(),
        dtype: FeatureDType::I64,
    });
    columns.push(FeatureColumn {
        name: "week_of_year".to_string(),
        dtype: FeatureDType::I64,
    });

    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = cfg.schema_version,
        lags = ?cfg.lags,
        rolling_windows = ?cfg.rolling_windows,
        rolling_alignment = cfg.rolling_alignment.as_str(),
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

/// Derives one feature row per day that has full history; earlier days are dropped.
pub fn build_features(
    series: &DailySeries,
    cfg: &FeatureConfig,
) -> Result<(FeatureSchema, Vec<FeatureRow>, FeatureBuildReport), FeatureError> {
    validate_config(cfg)?;
    if let Some(missing) = series.missing_dates().first() {
        return Err(FeatureError::NonContiguous { missing: *missing });
    }

    let schema = build_feature_schema(cfg);
    let counts = series.counts();
    let end = cfg.rolling_alignment.window_end();

    let mut numeric: Vec<Vec<Option<f64>>> = Vec::new();
    for k in &cfg.lags {
        numeric.push(lag(&counts, *k as usize));
    }
    for w in &cfg.rolling_windows {
        numeric.push(trailing_mean(&counts, *w as usize, end));
        numeric.push(trailing_std(&counts, *w as usize, end));
    }

    let requirement = cfg.min_history();
    let mut rows = Vec::with_capacity(requirement.satisfied_rows(series.len()));
    for (idx, point) in series.points().iter().enumerate() {
        if !requirement.is_satisfied(idx, series.len()) {
            continue;
        }
        let values: Option<Vec<f64>> = numeric.iter().map(|column| column[idx]).collect();
        let Some(mut values) = values else {
            continue;
        };
        let (day_of_week, week_of_year) = calendar_features(point.date);
        values.push(day_of_week);
        values.push(week_of_year);

        rows.push(FeatureRow {
            date: point.date,
            count: point.count,
            values,
        });
    }

    let report = FeatureBuildReport {
        input_rows: series.len() as u64,
        output_rows: rows.len() as u64,
        dropped_rows: (series.len() - rows.len()) as u64,
        min_history_days: requirement.lookback as u64,
        rolling_alignment: cfg.rolling_alignment,
    };

    info!(
        component = "features",
        event = "features.build.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        dropped_rows = report.dropped_rows,
        min_history_days = report.min_history_days,
        rolling_alignment = report.rolling_alignment.as_str()
    );

    Ok((schema, rows, report))
}

/// Day of week (Monday = 0) and ISO week number.
pub fn calendar_features(date: NaiveDate) -> (f64, f64) {
    (
        date.weekday().num_days_from_monday() as f64,
        date.iso_week().week() as f64,
    )
}

pub fn write_features(
    path: &Path,
    schema: &FeatureSchema,
    rows: &[FeatureRow],
) -> Result<(), FeatureError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(schema.csv_header())?;

    for row in rows {
        let mut record = Vec::with_capacity(row.values.len() + 2);
        record.push(row.date.to_string());
        record.push(row.count.to_string());
        for (value, column) in row.values.iter().zip(&schema.columns) {
            record.push(match column.dtype {
                FeatureDType::F64 => value.to_string(),
                FeatureDType::I64 => (*value as i64).to_string(),
            });
        }
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|err| {
        SeriesError::Io(std::io::Error::new(
            err.error().kind(),
            err.error().to_string(),
        ))
    })?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Reads `features.csv`, requiring its header to match the configured schema exactly.
pub fn read_features(
    path: &Path,
    cfg: &FeatureConfig,
) -> Result<(FeatureSchema, Vec<FeatureRow>), FeatureError> {
    let schema = build_feature_schema(cfg);
    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();
    let expected = schema.csv_header();
    let actual: Vec<String> = headers.iter().map(str::to_string).collect();
    if actual != expected {
        return Err(FeatureError::SchemaMismatch { expected, actual });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(parse_feature_record(&record?, &schema)?);
    }

    info!(
        component = "features",
        event = "features.read",
        path = %path.display(),
        rows = rows.len(),
        fingerprint = %schema.fingerprint
    );

    Ok((schema, rows))
}

pub fn run_feature_build(cfg: &PipelineConfig) -> Result<FeatureBuildReport, FeatureError> {
    let rows = read_daily_counts(&cfg.paths.filled_counts)?;
    let (series, _) = DailySeries::from_unsorted(rows);
    let (schema, features, report) = build_features(&series, &cfg.features)?;
    write_features(&cfg.paths.features, &schema, &features)?;
    Ok(report)
}

fn parse_feature_record(
    record: &StringRecord,
    schema: &FeatureSchema,
) -> Result<FeatureRow, FeatureError> {
    let date = parse_date_field(record, 0, DATE_COLUMN)?;
    let count = parse_count_field(record, 1, COUNT_COLUMN)?;
    let mut values = Vec::with_capacity(schema.columns.len());
    for (offset, column) in schema.columns.iter().enumerate() {
        values.push(parse_f64_field(record, offset + 2, &column.name)?);
    }
    Ok(FeatureRow {
        date,
        count,
        values,
    })
}

fn validate_config(cfg: &FeatureConfig) -> Result<(), FeatureError> {
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(FeatureError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }
    if cfg.lags.is_empty() && cfg.rolling_windows.is_empty() {
        return Err(FeatureError::InvalidConfig(
            "at least one lag or rolling window is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for k in &cfg.lags {
        if *k == 0 {
            return Err(FeatureError::InvalidConfig(
                "lags entries must be > 0".to_string(),
            ));
        }
        if !seen.insert(*k) {
            return Err(FeatureError::InvalidConfig(
                "lags entries must be unique".to_string(),
            ));
        }
    }

    seen.clear();
    for w in &cfg.rolling_windows {
        if *w < 2 {
            return Err(FeatureError::InvalidConfig(
                "rolling_windows entries must be >= 2".to_string(),
            ));
        }
        if !seen.insert(*w) {
            return Err(FeatureError::InvalidConfig(
                "rolling_windows entries must be unique".to_string(),
            ));
        }
    }

    Ok(())
}

fn schema_fingerprint(cfg: &FeatureConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!(
        "rolling_alignment:{};",
        cfg.rolling_alignment.as_str()
    ));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        match column.dtype {
            FeatureDType::F64 => hasher.update(":f64;"),
            FeatureDType::I64 => hasher.update(":i64;"),
        }
    }
    hex::encode(hasher.finalize())
}
