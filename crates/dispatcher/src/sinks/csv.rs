//! CsvSink - readings to rotated CSV files
//!
//! Files are written under a `.wip__` prefix and renamed when closed, so an
//! uploader watching the directory only sees finished files. A closed file
//! without data rows is removed instead.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use contracts::{Clock, ContractError, CsvConfig, DataSink, Reading, SystemClock};
use tracing::{debug, info, instrument};

use crate::rotation::{RotationPolicy, RotationState, RotationTrigger};

/// Prefix of files still being written
pub use contracts::CSV_WIP_PREFIX as WIP_PREFIX;

/// Column order of every CSV file
pub const CSV_COLUMNS: [&str; 21] = [
    "timestamp",
    "power_w",
    "consumption_day_kwh",
    "consumption_night_kwh",
    "injection_day_kwh",
    "injection_night_kwh",
    "tariff",
    "l1_consumption_w",
    "l1_injection_w",
    "l1_voltage_v",
    "l1_current_a",
    "l2_consumption_w",
    "l2_injection_w",
    "l2_voltage_v",
    "l2_current_a",
    "l3_consumption_w",
    "l3_injection_w",
    "l3_voltage_v",
    "l3_current_a",
    "gas_timestamp",
    "gas_m3",
];

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One CSV row in `CSV_COLUMNS` order
pub fn csv_row(reading: &Reading) -> Vec<String> {
    let c = &reading.counters;
    let mut row = vec![
        reading.timestamp.to_rfc3339(),
        reading.power_w.to_string(),
        c.consumption_day_kwh.to_string(),
        c.consumption_night_kwh.to_string(),
        c.injection_day_kwh.to_string(),
        c.injection_night_kwh.to_string(),
        reading.tariff.map(|t| t.as_str().to_string()).unwrap_or_default(),
    ];
    for index in 0..3 {
        match reading.phase(index) {
            Some(phase) => row.extend([
                phase.consumption_w.to_string(),
                phase.injection_w.to_string(),
                opt(phase.voltage_v),
                opt(phase.current_a),
            ]),
            None => row.extend(std::iter::repeat_n(String::new(), 4)),
        }
    }
    match &reading.gas {
        Some(gas) => row.extend([gas.timestamp.to_rfc3339(), gas.total_m3.to_string()]),
        None => row.extend([String::new(), String::new()]),
    }
    row
}

struct OpenFile {
    wip_path: PathBuf,
    stem: String,
    writer: ::csv::Writer<File>,
}

/// Sink that appends readings to rotating CSV files
pub struct CsvSink {
    name: String,
    dir: PathBuf,
    prefix: String,
    write_header: bool,
    write_every: usize,
    policy: RotationPolicy,
    state: RotationState,
    file: Option<OpenFile>,
    pending: Vec<Reading>,
    clock: Arc<dyn Clock>,
    completed: Vec<PathBuf>,
}

impl CsvSink {
    /// Create a new CsvSink
    pub fn new(name: impl Into<String>, config: &CsvConfig) -> Result<Self, ContractError> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: &CsvConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        fs::create_dir_all(&config.file_path).map_err(|e| {
            ContractError::rotation(config.file_path.display().to_string(), e.to_string())
                .into_sink_error(&name)
        })?;

        Ok(Self {
            name,
            dir: config.file_path.clone(),
            prefix: config.file_prefix.clone(),
            write_header: config.write_header,
            write_every: config.write_every.max(1) as usize,
            policy: RotationPolicy::from(config),
            state: RotationState::Closed,
            file: None,
            pending: Vec::new(),
            clock,
            completed: Vec::new(),
        })
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    /// Finished files, in the order they were closed
    pub fn completed_files(&self) -> &[PathBuf] {
        &self.completed
    }

    /// Readings waiting for the next `write_every` batch
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn rotation_error(&self, path: &Path, e: impl ToString) -> ContractError {
        ContractError::rotation(path.display().to_string(), e.to_string()).into_sink_error(&self.name)
    }

    fn open_file(&mut self) -> Result<(), ContractError> {
        let stamp = self.clock.wall_clock().format("%Y%m%d%H%M%S");
        let stem = format!("{}_{}", self.prefix, stamp);
        let wip_path = self.dir.join(format!("{WIP_PREFIX}{stem}.csv"));

        let file = File::create(&wip_path).map_err(|e| self.rotation_error(&wip_path, e))?;
        let mut writer = ::csv::Writer::from_writer(file);
        if self.write_header {
            writer
                .write_record(CSV_COLUMNS)
                .map_err(|e| self.rotation_error(&wip_path, e))?;
        }

        info!(sink = %self.name, file = %wip_path.display(), "CSV file created");
        self.file = Some(OpenFile {
            wip_path,
            stem,
            writer,
        });
        self.state = RotationState::opened(self.clock.now());
        Ok(())
    }

    /// First free `<stem>.csv`, `<stem>_1.csv`, ...
    fn target_path(&self, stem: &str) -> PathBuf {
        let mut candidate = self.dir.join(format!("{stem}.csv"));
        let mut suffix = 0;
        while candidate.exists() {
            suffix += 1;
            candidate = self.dir.join(format!("{stem}_{suffix}.csv"));
        }
        candidate
    }

    fn close_file(&mut self, trigger: Option<RotationTrigger>) -> Result<(), ContractError> {
        let Some(mut open) = self.file.take() else {
            return Ok(());
        };
        let lines = self.state.lines();
        self.state = RotationState::Closed;

        open.writer
            .flush()
            .map_err(|e| self.rotation_error(&open.wip_path, e))?;
        drop(open.writer);

        if lines == 0 {
            debug!(sink = %self.name, file = %open.wip_path.display(), "removing CSV file without rows");
            return fs::remove_file(&open.wip_path).map_err(|e| self.rotation_error(&open.wip_path, e));
        }

        let target = self.target_path(&open.stem);
        fs::rename(&open.wip_path, &target).map_err(|e| self.rotation_error(&target, e))?;

        if let Some(trigger) = trigger {
            ::metrics::counter!("smartmeter_csv_rotations_total", "trigger" => trigger.as_str())
                .increment(1);
        }
        info!(
            sink = %self.name,
            file = %target.display(),
            lines,
            trigger = trigger.map(|t| t.as_str()).unwrap_or("close"),
            "CSV file completed"
        );
        self.completed.push(target);
        Ok(())
    }

    fn write_row(&mut self, reading: &Reading) -> Result<(), ContractError> {
        if let Some(trigger) = self.policy.check(&self.state, self.clock.now()) {
            self.close_file(Some(trigger))?;
        }
        if !self.state.is_open() {
            self.open_file()?;
        }

        let name = &self.name;
        let Some(open) = self.file.as_mut() else {
            return Err(ContractError::sink_write(name, "no open CSV file"));
        };
        open.writer
            .write_record(csv_row(reading))
            .map_err(|e| ContractError::sink_write(name, e.to_string()))?;
        self.state.record_row();

        // close as soon as the file is full so it is renamed promptly
        if self.policy.check(&self.state, self.clock.now()) == Some(RotationTrigger::Lines) {
            self.close_file(Some(RotationTrigger::Lines))?;
        }
        Ok(())
    }

    /// Write every pending reading; rows that fail are not retried
    fn write_pending(&mut self) -> Result<(), ContractError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending);
        debug!(sink = %self.name, rows = rows.len(), "writing CSV rows");
        for reading in &rows {
            self.write_row(reading)?;
        }
        if let Some(open) = self.file.as_mut() {
            open.writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }
}

impl DataSink for CsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "csv_sink_write", skip(self, reading), fields(sink = %self.name))]
    async fn write(&mut self, reading: &Reading) -> Result<(), ContractError> {
        self.pending.push(reading.clone());
        if self.pending.len() >= self.write_every {
            self.write_pending()?;
        }
        Ok(())
    }

    async fn write_batch(&mut self, readings: &[Reading]) -> Result<(), ContractError> {
        self.pending.extend_from_slice(readings);
        if self.pending.len() >= self.write_every {
            self.write_pending()?;
        }
        Ok(())
    }

    #[instrument(name = "csv_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.write_pending()
    }

    #[instrument(name = "csv_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        let written = self.write_pending();
        let closed = self.close_file(None);
        debug!(sink = %self.name, files = self.completed.len(), "CsvSink closed");
        written.and(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use contracts::{GasReading, ManualClock, PhaseReading};
    use tempfile::tempdir;

    fn config(dir: &Path, write_every: u32, max_lines: u64, max_age: u64) -> CsvConfig {
        CsvConfig {
            enabled: true,
            file_prefix: "meter".into(),
            file_path: dir.to_path_buf(),
            write_header: true,
            write_every,
            max_lines,
            max_age,
        }
    }

    fn reading(power_w: f64) -> Reading {
        let ts = DateTime::parse_from_rfc3339("2024-06-01T12:00:00+02:00").unwrap();
        Reading::new(ts, power_w)
    }

    fn files(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut done = Vec::new();
        let mut wip = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.starts_with(WIP_PREFIX) {
                wip.push(path);
            } else {
                done.push(path);
            }
        }
        done.sort();
        wip.sort();
        (done, wip)
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[tokio::test]
    async fn test_rotates_once_after_max_lines() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut sink = CsvSink::with_clock("csv", &config(dir.path(), 1, 100, 0), clock).unwrap();

        for i in 0..101 {
            sink.write(&reading(i as f64)).await.unwrap();
        }

        let (done, wip) = files(dir.path());
        assert_eq!(done.len(), 1);
        assert_eq!(wip.len(), 1);
        // header + 100 data rows
        assert_eq!(line_count(&done[0]), 101);
        assert_eq!(line_count(&wip[0]), 2);
    }

    #[tokio::test]
    async fn test_header_does_not_count() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path(), 1, 3, 0);
        cfg.write_header = false;
        let mut sink = CsvSink::new("csv", &cfg).unwrap();

        for _ in 0..3 {
            sink.write(&reading(1.0)).await.unwrap();
        }
        let (done, wip) = files(dir.path());
        assert_eq!(done.len(), 1);
        assert!(wip.is_empty());
        assert_eq!(line_count(&done[0]), 3);
    }

    #[tokio::test]
    async fn test_age_rotation_on_next_write() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut sink =
            CsvSink::with_clock("csv", &config(dir.path(), 1, 100, 300), clock.clone()).unwrap();

        sink.write(&reading(1.0)).await.unwrap();
        clock.advance_secs(301);
        assert!(files(dir.path()).0.is_empty());

        sink.write(&reading(2.0)).await.unwrap();
        let (done, wip) = files(dir.path());
        assert_eq!(done.len(), 1);
        assert_eq!(wip.len(), 1);
        assert_eq!(line_count(&done[0]), 2);
    }

    #[tokio::test]
    async fn test_write_every_batches_rows() {
        let dir = tempdir().unwrap();
        let mut sink = CsvSink::new("csv", &config(dir.path(), 3, 100, 0)).unwrap();

        sink.write(&reading(1.0)).await.unwrap();
        sink.write(&reading(2.0)).await.unwrap();
        assert_eq!(sink.pending_len(), 2);
        assert!(!sink.state().is_open());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());

        sink.write(&reading(3.0)).await.unwrap();
        assert_eq!(sink.state().lines(), 3);

        sink.write(&reading(4.0)).await.unwrap();
        sink.close().await.unwrap();
        let (done, wip) = files(dir.path());
        assert!(wip.is_empty());
        assert_eq!(line_count(&done[0]), 5);
    }

    #[tokio::test]
    async fn test_rotation_counts_written_rows_only() {
        let dir = tempdir().unwrap();
        let mut sink = CsvSink::new("csv", &config(dir.path(), 4, 5, 0)).unwrap();

        // 4 buffered readings are not rows yet
        for _ in 0..4 {
            sink.write(&reading(1.0)).await.unwrap();
        }
        assert_eq!(sink.state().lines(), 4);
        for _ in 0..3 {
            sink.write(&reading(1.0)).await.unwrap();
        }
        assert_eq!(sink.state().lines(), 4);
        assert!(sink.completed_files().is_empty());

        sink.write(&reading(1.0)).await.unwrap();
        assert_eq!(sink.completed_files().len(), 1);
        assert_eq!(sink.state().lines(), 3);
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let mut sink = CsvSink::with_clock("csv", &config(dir.path(), 1, 1, 0), clock).unwrap();

        for _ in 0..3 {
            sink.write(&reading(1.0)).await.unwrap();
        }

        let completed = sink.completed_files().to_vec();
        assert_eq!(completed.len(), 3);
        let names: Vec<String> = completed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names[1].ends_with("_1.csv"), "{names:?}");
        assert!(names[2].ends_with("_2.csv"), "{names:?}");
    }

    #[test]
    fn test_row_layout() {
        let mut r = reading(-1800.0);
        r.phases.push(PhaseReading {
            consumption_w: 0.0,
            injection_w: 1800.0,
            voltage_v: Some(231.5),
            current_a: None,
        });
        r.gas = Some(GasReading {
            timestamp: r.timestamp,
            total_m3: 1234.5,
        });

        let row = csv_row(&r);
        assert_eq!(row.len(), CSV_COLUMNS.len());
        assert_eq!(row[1], "-1800");
        assert_eq!(row[9], "231.5");
        assert_eq!(row[10], "");
        assert_eq!(row[11], "");
        assert_eq!(row[20], "1234.5");
    }

    #[test]
    fn test_unwritable_directory_is_sink_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let result = CsvSink::new("csv", &config(&blocker.join("sub"), 1, 100, 0));
        assert!(matches!(result, Err(ContractError::SinkWrite { .. })));
    }
}
