//! # Integration Tests
//!
//! End-to-end tests across the workspace crates.
//!
//! - configuration files as written by users
//! - replay -> dispatcher -> CSV files + load workers
//! - full-speed replay through the CSV sink without losing a reading
//! - mock source -> interval sink under paused time

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{DispatchMode, LogFormat};
    use std::time::Duration;

    const CONFIG: &str = r#"
[logging]
loglevel = "debug"
logpath = "/var/log/smartmeter"
logfile = "meter"
keep = 3
size = "2M"
format = "json"

[digimeter]
port = "/dev/ttyAMA0"
baudrate = 115200

[telegram]
enabled = true
token = "123:abc"
chat_id = "42"

[influx]
enabled = true
url = "https://influx.local:8086"
token = "secret"
org = "home"
bucket = "meter"
upload_interval = 60

[csv]
enabled = true
file_path = "/data/csv"
max_lines = 500

[loads.aux]
enabled = true
max_power = 2000
switch_on = 75
switch_off = 10
hold_timer = 30

[loads.boiler]
enabled = false
max_power = 2400
switch_on = 90
switch_off = 20
address = "192.168.1.50"
"#;

    #[test]
    fn test_full_config() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.size.as_u64(), 2 * 1024 * 1024);
        assert!(config.logging.log_file_path().ends_with("meter.log"));
        assert_eq!(config.digimeter.port, "/dev/ttyAMA0");
        assert_eq!(config.enabled_sink_count(), 3);

        let loads: Vec<_> = config.enabled_loads().map(|(name, _)| name.as_str()).collect();
        assert_eq!(loads, vec!["aux"]);
        assert_eq!(config.loads["aux"].hold_duration(), Duration::from_secs(30));

        assert_eq!(config.csv.sink_config().mode(), DispatchMode::Immediate);
        assert_eq!(
            config.influx.sink_config().mode(),
            DispatchMode::Interval(Duration::from_secs(60))
        );
        assert_eq!(
            config.telegram.sink_config().mode(),
            DispatchMode::Interval(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_serialized_config_loads_again() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();

        assert_eq!(reloaded.loads.len(), 2);
        assert_eq!(reloaded.influx.upload_interval, 60);
        assert_eq!(reloaded.csv.max_lines, 500);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let broken = CONFIG.replace("switch_off = 10", "switch_off = 80");
        let err = ConfigLoader::load_from_str(&broken, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("switch_off"));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    use chrono::DateTime;
    use contracts::{ApplianceConfig, LoadConfig, PowerState, Reading, SinkConfig};
    use dispatcher::sinks::WIP_PREFIX;
    use dispatcher::{create_dispatcher, DispatcherBuilder, DispatcherConfig, SinkSpec};
    use ingestion::{IngestionPipeline, MockReadingSource, MockSourceConfig, ReplaySource};
    use load_control::{ActuatorOptions, LoadManager};
    use tempfile::tempdir;

    fn reading(second: u32, power_w: f64) -> Reading {
        let ts = DateTime::parse_from_rfc3339(&format!("2024-06-01T12:00:{second:02}+02:00")).unwrap();
        let mut reading = Reading::new(ts, power_w);
        reading.counters.consumption_day_kwh = 1000.0 + f64::from(second) / 1000.0;
        reading
    }

    fn write_replay(path: &Path, readings: &[Reading]) {
        let mut file = fs::File::create(path).unwrap();
        for reading in readings {
            writeln!(file, "{}", serde_json::to_string(reading).unwrap()).unwrap();
        }
    }

    fn aux_load() -> LoadConfig {
        LoadConfig {
            enabled: true,
            max_power: 1000,
            switch_on: 75,
            switch_off: 10,
            hold_timer: 0,
            address: None,
            gpio_pin: None,
        }
    }

    /// Data rows of every finished CSV file, in file name order
    fn finished_csv_rows(dir: &Path) -> Vec<usize> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();
        files
            .iter()
            .map(|path| fs::read_to_string(path).unwrap().lines().count() - 1)
            .collect()
    }

    /// Replay -> Dispatcher -> CSV sink + aux load worker
    #[tokio::test]
    async fn test_e2e_replay_pipeline() {
        let dir = tempdir().unwrap();
        let csv_dir = dir.path().join("csv");
        let replay_path = dir.path().join("readings.ndjson");

        // six readings of strong export, then four of heavy import
        let readings: Vec<_> = (0..10)
            .map(|i| reading(i, if i < 6 { -2000.0 } else { 1500.0 }))
            .collect();
        write_replay(&replay_path, &readings);

        let mut config = ApplianceConfig::default();
        config.csv.enabled = true;
        config.csv.file_path = csv_dir.clone();
        config.csv.write_every = 1;
        config.csv.max_lines = 4;
        config.csv.max_age = 0;
        config.loads.insert("aux".to_string(), aux_load());

        let options = ActuatorOptions {
            dry_run: true,
            ..Default::default()
        };
        let loads = LoadManager::from_config(&config, &options).unwrap();
        loads.prepare().await.unwrap();
        let status = loads.status();

        let mut ingestion = IngestionPipeline::new(32);
        ingestion
            .start(ReplaySource::open(&replay_path).await.unwrap())
            .unwrap();
        let rx = ingestion.take_receiver().unwrap();

        let mut dispatcher = create_dispatcher(&config, rx).unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["csv"]);
        let load_tasks = loads.spawn(|name| dispatcher.subscribe(name, 64));

        let report = tokio::time::timeout(Duration::from_secs(10), dispatcher.spawn())
            .await
            .expect("dispatcher should finish when the replay ends")
            .unwrap();
        let snapshots = load_tasks.join().await;

        assert_eq!(report.readings, 10);
        assert!(report.timed_out.is_empty());
        let (_, csv) = &report.sinks[0];
        assert_eq!(csv.delivered_count, 10);
        assert_eq!(csv.failure_count, 0);

        // rotated every four rows, the remainder closed at shutdown
        assert_eq!(finished_csv_rows(&csv_dir), vec![4, 4, 2]);
        let leftovers = fs::read_dir(&csv_dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with(WIP_PREFIX))
            .count();
        assert_eq!(leftovers, 0);

        // switched on by the export, off again by the import
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, PowerState::Off);
        assert_eq!(snapshots[0].commands, 2);
        assert_eq!(status.get("aux").unwrap().state, PowerState::Off);
    }

    /// A replay at full speed outruns every queue; nothing may be lost
    #[tokio::test]
    async fn test_e2e_fast_replay_delivers_every_line() {
        let dir = tempdir().unwrap();
        let csv_dir = dir.path().join("csv");
        let replay_path = dir.path().join("readings.ndjson");

        let readings: Vec<_> = (0..5000u32)
            .map(|i| {
                let ts = DateTime::parse_from_rfc3339("2024-06-01T00:00:00+02:00").unwrap()
                    + chrono::Duration::seconds(i64::from(i));
                Reading::new(ts, -1000.0 + f64::from(i % 7))
            })
            .collect();
        write_replay(&replay_path, &readings);

        let mut config = ApplianceConfig::default();
        config.csv.enabled = true;
        config.csv.file_path = csv_dir.clone();
        config.csv.write_every = 1;

        let mut ingestion = IngestionPipeline::new(100);
        ingestion
            .start(ReplaySource::open(&replay_path).await.unwrap().with_speed(0.0))
            .unwrap();
        let rx = ingestion.take_receiver().unwrap();
        let metrics = ingestion.metrics();

        let dispatcher = create_dispatcher(&config, rx).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(60), dispatcher.run())
            .await
            .expect("dispatcher should finish when the replay ends");

        assert_eq!(metrics.snapshot().readings_received, 5000);
        assert_eq!(metrics.snapshot().readings_dropped, 0);
        assert_eq!(report.readings, 5000);
        let (_, csv) = &report.sinks[0];
        assert_eq!(csv.delivered_count, 5000);
        assert_eq!(csv.dropped_count, 0);
        assert_eq!(finished_csv_rows(&csv_dir).iter().sum::<usize>(), 5000);
    }

    /// Mock source -> interval sink + immediate sink under paused time
    #[tokio::test(start_paused = true)]
    async fn test_e2e_mock_interval_delivery() {
        let mut ingestion = IngestionPipeline::new(8);
        let source = MockReadingSource::new(MockSourceConfig {
            profile: vec![-500.0, 250.0],
            period: Duration::from_secs(1),
            limit: Some(25),
            ..Default::default()
        })
        .unwrap();
        ingestion.start(source).unwrap();
        let rx = ingestion.take_receiver().unwrap();

        let config = DispatcherConfig {
            sinks: vec![
                SinkSpec::Log(SinkConfig::interval("batched", 10)),
                SinkSpec::Log(SinkConfig::immediate("live")),
                SinkSpec::Log(SinkConfig {
                    enabled: false,
                    ..SinkConfig::immediate("off")
                }),
            ],
            shutdown_timeout: Duration::from_secs(5),
        };
        let dispatcher = DispatcherBuilder::new(config, rx).build().unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["batched", "live"]);

        let report = dispatcher.run().await;

        assert_eq!(report.readings, 25);
        for (name, metrics) in &report.sinks {
            assert_eq!(metrics.delivered_count, 25, "sink {name}");
            assert_eq!(metrics.dropped_count, 0, "sink {name}");
        }
        assert_eq!(ingestion.metrics().snapshot().readings_received, 25);
    }

    /// Meter statistics over a replayed run
    #[tokio::test]
    async fn test_meter_summary_from_replay() {
        let dir = tempdir().unwrap();
        let replay_path = dir.path().join("readings.ndjson");
        let readings: Vec<_> = (0..4).map(|i| reading(i * 10, -400.0)).collect();
        write_replay(&replay_path, &readings);

        let mut ingestion = IngestionPipeline::new(8);
        ingestion
            .start(ReplaySource::open(&replay_path).await.unwrap())
            .unwrap();
        let rx = ingestion.take_receiver().unwrap();

        let mut meter = observability::MeterStatsAggregator::new();
        while let Ok(reading) = rx.recv().await {
            meter.update(&reading);
        }

        let summary = meter.summary();
        assert_eq!(summary.total_readings, 4);
        assert_eq!(summary.span_secs, 30);
        assert!((summary.surplus_rate - 100.0).abs() < 1e-9);
        assert!((summary.consumed_kwh - 0.03).abs() < 1e-9);
    }
}
