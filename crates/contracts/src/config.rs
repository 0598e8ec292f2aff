//! ApplianceConfig - Config Loader output
//!
//! Describes the complete appliance: logging, the meter's serial line, the
//! output sinks, and the controllable loads keyed by section name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::ByteSize;

/// Section name reserved for the directly wired load
pub const AUX_LOAD_NAME: &str = "aux";

/// GPIO pin the aux load relay is wired to
pub const DEFAULT_AUX_GPIO_PIN: u32 = 24;

/// Complete appliance configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplianceConfig {
    /// Logging targets
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Serial line of the digital meter
    #[serde(default)]
    pub digimeter: SerialConfig,

    /// Notification bot sink
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Time-series database sink
    #[serde(default)]
    pub influx: InfluxConfig,

    /// CSV file sink
    #[serde(default)]
    pub csv: CsvConfig,

    /// Object store upload of finished CSV files
    #[serde(default)]
    pub upload: UploadConfig,

    /// Controllable loads (load name -> config)
    #[serde(default)]
    pub loads: BTreeMap<String, LoadConfig>,
}

impl ApplianceConfig {
    /// Loads with `enabled = true`, in name order
    pub fn enabled_loads(&self) -> impl Iterator<Item = (&String, &LoadConfig)> {
        self.loads.iter().filter(|(_, load)| load.enabled)
    }

    /// Number of enabled sinks
    pub fn enabled_sink_count(&self) -> usize {
        [self.telegram.enabled, self.influx.enabled, self.csv.enabled]
            .iter()
            .filter(|enabled| **enabled)
            .count()
    }
}

// ===== Logging =====

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Directory of the log file
    #[serde(default = "default_logpath")]
    pub logpath: PathBuf,

    /// Log file name (".log" is appended when missing)
    #[serde(default = "default_logfile", alias = "filename")]
    pub logfile: String,

    /// Rotated files to keep
    #[serde(default = "default_keep")]
    pub keep: u32,

    /// Size above which the log file is rotated
    #[serde(default = "default_log_size")]
    pub size: ByteSize,

    #[serde(default = "default_true")]
    pub log_to_stdout: bool,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            logpath: default_logpath(),
            logfile: default_logfile(),
            keep: default_keep(),
            size: default_log_size(),
            log_to_stdout: true,
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Full path of the log file
    pub fn log_file_path(&self) -> PathBuf {
        let file = if self.logfile.ends_with(".log") {
            self.logfile.clone()
        } else {
            format!("{}.log", self.logfile)
        };
        self.logpath.join(file)
    }
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_logpath() -> PathBuf {
    PathBuf::from(".")
}

fn default_logfile() -> String {
    "smartmeter.log".to_string()
}

fn default_keep() -> u32 {
    2
}

fn default_log_size() -> ByteSize {
    ByteSize(1024 * 1024)
}

fn default_true() -> bool {
    true
}

// ===== Serial line =====

/// Serial settings of the meter port, consumed by the telegram decoder
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    #[validate(length(min = 1, message = "port cannot be empty"))]
    pub port: String,

    #[serde(default = "default_baudrate", alias = "speed")]
    #[validate(range(min = 1, message = "baudrate must be > 0"))]
    pub baudrate: u32,

    #[serde(default = "default_bytesize", alias = "bytes")]
    #[validate(range(min = 5, max = 8, message = "bytesize must be between 5 and 8"))]
    pub bytesize: u8,

    #[serde(default = "default_parity")]
    pub parity: String,

    #[serde(default = "default_stopbits")]
    #[validate(range(min = 1, max = 2, message = "stopbits must be 1 or 2"))]
    pub stopbits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baudrate: default_baudrate(),
            bytesize: default_bytesize(),
            parity: default_parity(),
            stopbits: default_stopbits(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baudrate() -> u32 {
    115_200
}

fn default_bytesize() -> u8 {
    8
}

fn default_parity() -> String {
    "N".to_string()
}

fn default_stopbits() -> u8 {
    1
}

// ===== Sinks =====

/// When a sink receives readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Every reading is handed over on arrival
    Immediate,
    /// Readings are buffered and flushed once per period
    Interval(Duration),
}

/// What an interval flush delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Every buffered reading, in arrival order
    #[default]
    All,
    /// Only the most recent reading of the window
    Latest,
}

/// Dispatch settings of one sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Sink name (used for logging/metrics)
    pub name: String,

    pub enabled: bool,

    /// Flush period in seconds, 0 = immediate-on-arrival
    pub interval_secs: u64,

    /// Capacity of the handoff channel between dispatcher and sink worker
    pub queue_capacity: usize,

    /// Maximum readings held in an interval buffer (oldest dropped first)
    pub buffer_capacity: usize,

    pub batch: BatchPolicy,
}

impl SinkConfig {
    /// Immediate sink with default capacities
    pub fn immediate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            interval_secs: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            batch: BatchPolicy::All,
        }
    }

    /// Interval sink with default capacities
    pub fn interval(name: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            interval_secs,
            ..Self::immediate(name)
        }
    }

    pub fn with_batch(mut self, batch: BatchPolicy) -> Self {
        self.batch = batch;
        self
    }

    /// Effective dispatch mode; an interval of 0 means immediate
    pub fn mode(&self) -> DispatchMode {
        if self.interval_secs == 0 {
            DispatchMode::Immediate
        } else {
            DispatchMode::Interval(Duration::from_secs(self.interval_secs))
        }
    }
}

/// Default handoff channel capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default interval buffer bound
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Notification bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub chat_id: String,

    /// Seconds between two status messages
    #[serde(default = "default_notify_interval")]
    pub notify_interval: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            chat_id: String::new(),
            notify_interval: default_notify_interval(),
        }
    }
}

impl TelegramConfig {
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            enabled: self.enabled,
            ..SinkConfig::interval("telegram", self.notify_interval).with_batch(BatchPolicy::Latest)
        }
    }
}

fn default_notify_interval() -> u64 {
    3600
}

/// Time-series database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// PEM file with an extra root certificate
    #[serde(default)]
    pub ssl_ca_cert: Option<PathBuf>,

    /// Seconds between uploads, 0 = upload every reading
    #[serde(default)]
    pub upload_interval: u64,

    /// Request timeout in seconds
    #[serde(default = "default_influx_timeout")]
    pub timeout: u64,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            verify_ssl: true,
            ssl_ca_cert: None,
            upload_interval: 0,
            timeout: default_influx_timeout(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl InfluxConfig {
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            enabled: self.enabled,
            buffer_capacity: self.buffer_capacity,
            ..SinkConfig::interval("influx", self.upload_interval)
        }
    }
}

fn default_influx_timeout() -> u64 {
    30
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

/// Prefix of CSV files still being written
pub const CSV_WIP_PREFIX: &str = ".wip__";

/// CSV files with rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Output directory
    #[serde(default)]
    pub file_path: PathBuf,

    #[serde(default = "default_true")]
    pub write_header: bool,

    /// Rows are written in batches of this many readings
    #[serde(default = "default_write_every")]
    pub write_every: u32,

    /// Data rows per file, 0 disables the line trigger
    #[serde(default = "default_max_lines")]
    pub max_lines: u64,

    /// File age in seconds, 0 disables the age trigger
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_prefix: default_file_prefix(),
            file_path: PathBuf::new(),
            write_header: true,
            write_every: default_write_every(),
            max_lines: default_max_lines(),
            max_age: default_max_age(),
        }
    }
}

impl CsvConfig {
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            enabled: self.enabled,
            ..SinkConfig::immediate("csv")
        }
    }
}

impl CsvConfig {
    /// Whether `file_name` is a closed CSV file of this sink
    pub fn is_finished_file(&self, file_name: &str) -> bool {
        !file_name.starts_with(CSV_WIP_PREFIX)
            && file_name.ends_with(".csv")
            && file_name
                .strip_prefix(self.file_prefix.as_str())
                .is_some_and(|rest| rest.starts_with('_'))
    }
}

fn default_file_prefix() -> String {
    "smartmeter".to_string()
}

fn default_write_every() -> u32 {
    30
}

fn default_max_lines() -> u64 {
    100
}

fn default_max_age() -> u64 {
    300
}

// ===== Upload =====

/// S3-compatible bucket that receives finished CSV files
///
/// Access keys are not part of the file; they come from
/// `SMARTMETER_ACCESS_KEY` and `SMARTMETER_SECRET_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub bucket: String,

    /// Store host or URL, `https://` when no scheme is given; empty = AWS
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Prepended to every object key
    #[serde(default)]
    pub key_prefix: String,

    /// Address the bucket in the path rather than the host name
    #[serde(default = "default_true")]
    pub path_style: bool,

    /// Seconds between upload passes during `run`, 0 = `smartmeter upload` only
    #[serde(default)]
    pub interval: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket: String::new(),
            endpoint: String::new(),
            region: default_region(),
            key_prefix: String::new(),
            path_style: true,
            interval: 0,
        }
    }
}

impl UploadConfig {
    /// Upload period while running, if periodic uploads are on
    pub fn period(&self) -> Option<Duration> {
        (self.enabled && self.interval > 0).then(|| Duration::from_secs(self.interval))
    }

    /// Endpoint URL; the regional AWS endpoint when none is configured
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            format!("https://s3.{}.amazonaws.com", self.region)
        } else if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

// ===== Loads =====

/// One controllable load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LoadConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Rated power in Watt
    #[validate(range(min = 1, message = "max_power must be > 0"))]
    pub max_power: u32,

    /// Switch on when surplus reaches this percentage of max_power
    #[validate(range(max = 100, message = "switch_on must be between 0 and 100"))]
    pub switch_on: u8,

    /// Switch off when surplus falls to this percentage of max_power
    #[validate(range(max = 100, message = "switch_off must be between 0 and 100"))]
    pub switch_off: u8,

    /// Seconds a desired change must persist before it is committed
    #[serde(default)]
    pub hold_timer: u64,

    /// Address of a remotely switched load; required unless the section is `aux`
    #[serde(default)]
    pub address: Option<String>,

    /// GPIO pin of the directly wired load
    #[serde(default)]
    pub gpio_pin: Option<u32>,
}

impl LoadConfig {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_timer)
    }
}
