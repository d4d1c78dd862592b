//! Pipeline configuration: artifact paths and per-stage knobs.
//!
//! `PipelineConfig::default()` reproduces the fixed `data/` layout;
//! `pipeline_config_from_env` overrides individual values.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::aggregate::DEFAULT_TIMESTAMP_COLUMN;
use crate::features::{FeatureConfig, RollingAlignment};
use crate::model::{GbConfig, TrainingTarget, DEFAULT_TEST_RATIO};
use crate::monitor::MonitorConfig;
use crate::observability::{LogFormat, LoggingConfig};
use crate::repair::FillPolicy;
use crate::target::DEFAULT_TARGET_HORIZON_DAYS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub raw_requests: PathBuf,
    pub daily_counts: PathBuf,
    pub filled_counts: PathBuf,
    pub features: PathBuf,
    pub target: PathBuf,
    pub monitoring: PathBuf,
    pub qa_report: PathBuf,
}

impl PipelinePaths {
    /// Conventional file names under one processed-data directory.
    pub fn under(processed_dir: &Path, raw_requests: PathBuf) -> Self {
        Self {
            raw_requests,
            daily_counts: processed_dir.join("daily_request_counts.csv"),
            filled_counts: processed_dir.join("daily_request_counts_filled.csv"),
            features: processed_dir.join("features.csv"),
            target: processed_dir.join("target_7day_avg.csv"),
            monitoring: processed_dir.join("monitoring_7day.csv"),
            qa_report: processed_dir.join("qa_report.txt"),
        }
    }
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self::under(
            Path::new("data/processed"),
            PathBuf::from("data/raw/requests_raw.csv"),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub logging: LoggingConfig,
    pub paths: PipelinePaths,
    pub timestamp_column: String,
    pub fill_policy: FillPolicy,
    pub features: FeatureConfig,
    pub target_horizon_days: usize,
    pub monitor: MonitorConfig,
    pub model: GbConfig,
    pub test_ratio: f64,
    pub training_target: TrainingTarget,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            paths: PipelinePaths::default(),
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            fill_policy: FillPolicy::Interpolate,
            features: FeatureConfig::default(),
            target_horizon_days: DEFAULT_TARGET_HORIZON_DAYS,
            monitor: MonitorConfig::default(),
            model: GbConfig::default(),
            test_ratio: DEFAULT_TEST_RATIO,
            training_target: TrainingTarget::DailyCount,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Defaults overridden by every non-blank `DEMAND_*` variable; a value that
/// does not parse is an error rather than silently ignored.
pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default();

    if let Some(raw) = non_empty_var("DEMAND_LOG_LEVEL") {
        config.logging.filter = raw;
        if config.logging.env_filter().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "DEMAND_LOG_LEVEL",
                value: config.logging.filter,
            });
        }
    }

    if let Some(raw) = non_empty_var("DEMAND_LOG_FORMAT") {
        config.logging.format = LogFormat::parse(&raw).ok_or(ConfigError::InvalidValue {
            key: "DEMAND_LOG_FORMAT",
            value: raw,
        })?;
    }

    if let Some(raw) = non_empty_var("DEMAND_LOG_TARGET") {
        config.logging.include_target = parse_bool(&raw).ok_or(ConfigError::InvalidValue {
            key: "DEMAND_LOG_TARGET",
            value: raw,
        })?;
    }

    let data_dir = non_empty_var("DEMAND_DATA_DIR").map(PathBuf::from);
    let raw_path = non_empty_var("DEMAND_RAW_PATH").map(PathBuf::from);
    if data_dir.is_some() || raw_path.is_some() {
        let processed = data_dir.unwrap_or_else(|| PathBuf::from("data/processed"));
        let raw = raw_path.unwrap_or_else(|| config.paths.raw_requests.clone());
        config.paths = PipelinePaths::under(&processed, raw);
    }

    if let Some(column) = non_empty_var("DEMAND_TIMESTAMP_COLUMN") {
        config.timestamp_column = column;
    }

    if let Some(raw) = non_empty_var("DEMAND_FILL_POLICY") {
        config.fill_policy = FillPolicy::parse(&raw).ok_or(ConfigError::InvalidValue {
            key: "DEMAND_FILL_POLICY",
            value: raw,
        })?;
    }

    if let Some(raw) = non_empty_var("DEMAND_ROLLING_ALIGNMENT") {
        config.features.rolling_alignment =
            RollingAlignment::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: "DEMAND_ROLLING_ALIGNMENT",
                value: raw,
            })?;
    }

    if let Some(raw) = non_empty_var("DEMAND_TEST_RATIO") {
        config.test_ratio = raw
            .parse::<f64>()
            .ok()
            .filter(|ratio| *ratio > 0.0 && *ratio < 1.0)
            .ok_or(ConfigError::InvalidValue {
                key: "DEMAND_TEST_RATIO",
                value: raw,
            })?;
    }

    if let Some(raw) = non_empty_var("DEMAND_TRAINING_TARGET") {
        config.training_target =
            TrainingTarget::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: "DEMAND_TRAINING_TARGET",
                value: raw,
            })?;
    }

    if let Some(raw) = non_empty_var("DEMAND_GB_SEED") {
        config.model.seed = raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            key: "DEMAND_GB_SEED",
            value: raw,
        })?;
    }

    Ok(config)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const KEYS: [&str; 11] = [
        "DEMAND_LOG_LEVEL",
        "DEMAND_LOG_FORMAT",
        "DEMAND_LOG_TARGET",
        "DEMAND_DATA_DIR",
        "DEMAND_RAW_PATH",
        "DEMAND_TIMESTAMP_COLUMN",
        "DEMAND_FILL_POLICY",
        "DEMAND_ROLLING_ALIGNMENT",
        "DEMAND_TEST_RATIO",
        "DEMAND_TRAINING_TARGET",
        "DEMAND_GB_SEED",
    ];

    /// Runs `pipeline_config_from_env` with exactly `set` present among the
    /// `DEMAND_*` keys, restoring the previous environment afterwards.
    fn load_with(set: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous: Vec<(&str, Option<String>)> =
            KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();
        for key in KEYS {
            env::remove_var(key);
        }
        for (key, value) in set {
            env::set_var(key, value);
        }

        let loaded = pipeline_config_from_env();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        loaded
    }

    #[test]
    fn defaults_match_fixed_layout() {
        let cfg = load_with(&[]).expect("defaults load");
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(
            cfg.paths.filled_counts,
            PathBuf::from("data/processed/daily_request_counts_filled.csv")
        );
        assert_eq!(cfg.fill_policy, FillPolicy::Interpolate);
        assert_eq!(cfg.test_ratio, 0.2);
        assert_eq!(cfg.logging.format, LogFormat::Compact);
    }

    #[test]
    fn env_overrides_paths_and_knobs() {
        let cfg = load_with(&[
            ("DEMAND_DATA_DIR", "/tmp/demand"),
            ("DEMAND_FILL_POLICY", "zero"),
            ("DEMAND_TEST_RATIO", "0.25"),
            ("DEMAND_GB_SEED", "7"),
            ("DEMAND_ROLLING_ALIGNMENT", "include_current"),
        ])
        .expect("overrides load");

        assert_eq!(cfg.paths.features, PathBuf::from("/tmp/demand/features.csv"));
        assert_eq!(cfg.paths.raw_requests, PathBuf::from("data/raw/requests_raw.csv"));
        assert_eq!(cfg.fill_policy, FillPolicy::ZeroFill);
        assert_eq!(cfg.test_ratio, 0.25);
        assert_eq!(cfg.model.seed, 7);
        assert_eq!(
            cfg.features.rolling_alignment,
            RollingAlignment::IncludeCurrent
        );
    }

    #[test]
    fn logging_knobs_load_with_the_pipeline() {
        let cfg = load_with(&[
            ("DEMAND_LOG_LEVEL", "demand311=debug,warn"),
            ("DEMAND_LOG_FORMAT", "json"),
            ("DEMAND_LOG_TARGET", "Yes"),
        ])
        .expect("logging overrides load");

        assert_eq!(cfg.logging.filter, "demand311=debug,warn");
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.logging.include_target);
        assert_eq!(cfg.paths, PipelinePaths::default());
    }

    #[test]
    fn blank_values_keep_defaults() {
        let cfg = load_with(&[("DEMAND_LOG_LEVEL", "  "), ("DEMAND_FILL_POLICY", "")])
            .expect("blank values ignored");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let cases = [
            ("DEMAND_FILL_POLICY", "guess"),
            ("DEMAND_LOG_FORMAT", "yaml"),
            ("DEMAND_LOG_TARGET", "maybe"),
            ("DEMAND_LOG_LEVEL", "demand311=loud"),
            ("DEMAND_TEST_RATIO", "1.5"),
            ("DEMAND_GB_SEED", "-1"),
        ];
        for (key, value) in cases {
            let err = load_with(&[(key, value)]).expect_err("invalid value");
            assert_eq!(
                err,
                ConfigError::InvalidValue {
                    key,
                    value: value.to_string()
                }
            );
        }
    }
}
