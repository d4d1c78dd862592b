use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{Days, NaiveDate};
use demand311::{
    build_features, monitor_series, repair_calendar, DailyCount, FeatureConfig, FillPolicy,
    LogFormat, LoggingConfig, MonitorConfig, StageRun,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.checked_add_days(Days::new(offset)))
        .expect("valid test date")
}

#[test]
fn stage_run_emits_start_and_finish_events() {
    let logging = LoggingConfig {
        filter: "demand311=debug".to_string(),
        format: LogFormat::Json,
        include_target: false,
    };
    let logs = capture_logs(Level::INFO, || {
        let stage = StageRun::start("repair_gaps", &logging);
        stage.finish(31);
    });

    assert!(logs.contains("\"event\":\"stage.start\""));
    assert!(logs.contains("\"log_filter\":\"demand311=debug\""));
    assert!(logs.contains("\"log_format\":\"json\""));
    assert!(logs.contains("\"event\":\"stage.finish\""));
    assert!(logs.contains("\"stage\":\"repair_gaps\""));
    assert!(logs.contains("\"rows_out\":31"));
    assert!(logs.contains("\"elapsed_ms\":"));
}

#[test]
fn repair_logs_duplicates_and_fill_summary() {
    let rows = vec![
        DailyCount::new(day(0), 10),
        DailyCount::new(day(0), 11),
        DailyCount::new(day(3), 40),
    ];
    let logs = capture_logs(Level::INFO, || {
        let (series, _) = repair_calendar(rows, FillPolicy::ZeroFill).expect("repair");
        assert_eq!(series.len(), 4);
    });

    assert!(logs.contains("\"event\":\"series.duplicates_removed\""));
    assert!(logs.contains("\"event\":\"repair.finish\""));
    assert!(logs.contains("\"policy\":\"zero\""));
}

#[test]
fn feature_and_monitor_stages_report_history_shortfalls() {
    let (series, _) = repair_calendar(
        (0..20).map(|i| DailyCount::new(day(i), 100 + i)).collect(),
        FillPolicy::Interpolate,
    )
    .expect("repair");

    let logs = capture_logs(Level::INFO, || {
        build_features(&series, &FeatureConfig::default()).expect("features");
        monitor_series(&series, &MonitorConfig::default()).expect("monitor");
    });

    assert!(logs.contains("\"event\":\"features.schema.built\""));
    assert!(logs.contains("\"event\":\"features.build.finish\""));
    assert!(logs.contains("\"event\":\"monitor.insufficient_history\""));
}

#[test]
fn boosting_stages_log_only_at_debug() {
    use demand311::{GbConfig, GradientBoostingRegressor, Regressor};

    let features: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
    let target: Vec<f64> = (0..8).map(|i| if i < 4 { 1.0 } else { 5.0 }).collect();
    let cfg = GbConfig {
        n_estimators: 3,
        ..GbConfig::default()
    };

    let info_logs = capture_logs(Level::INFO, || {
        GradientBoostingRegressor::new(cfg.clone())
            .fit(&features, &target)
            .expect("fit");
    });
    let debug_logs = capture_logs(Level::DEBUG, || {
        GradientBoostingRegressor::new(cfg.clone())
            .fit(&features, &target)
            .expect("fit");
    });

    assert!(!info_logs.contains("\"event\":\"model.boost.stage\""));
    assert!(debug_logs.contains("\"event\":\"model.boost.stage\""));
}
