//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Smartmeter - reads a digital electricity meter, exports the readings and
/// switches loads on surplus power
#[derive(Parser, Debug)]
#[command(
    name = "smartmeter",
    author,
    version,
    about = "Smart meter reading, export and surplus load control",
    long_about = "Reads meter readings, dispatches them to CSV files, InfluxDB and Telegram,\n\
                  and switches local loads on and off based on surplus power."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SMARTMETER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (overrides `[logging] format`)
    #[arg(long, value_enum, global = true, env = "SMARTMETER_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_overrides(&self) -> observability::LogOverrides {
        observability::LogOverrides {
            level: observability::LogOverrides::level_from_verbosity(self.verbose, u8::from(self.quiet)),
            format: self.log_format.map(Into::into),
            no_file: false,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the appliance
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Upload finished CSV files to the object store and remove them locally
    Upload(UploadArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "smartmeter.toml", env = "SMARTMETER_CONFIG")]
    pub config: PathBuf,

    /// Replay recorded readings (one JSON reading per line)
    #[arg(long, conflicts_with = "mock")]
    pub replay: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = original pace, 0 = as fast as possible)
    #[arg(long, default_value = "1.0")]
    pub replay_speed: f64,

    /// Restart the replay file when it ends
    #[arg(long = "loop", requires = "replay")]
    pub replay_loop: bool,

    /// Generate synthetic readings instead of reading the meter
    #[arg(long)]
    pub mock: bool,

    /// Net power values (W) cycled by the mock source
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "-1800,-1800,-400,600")]
    pub mock_profile: Vec<f64>,

    /// Seconds between two mock readings
    #[arg(long, default_value = "1")]
    pub mock_period: u64,

    /// Stop after this many readings (0 = unlimited)
    #[arg(long, default_value = "0", env = "SMARTMETER_MAX_READINGS")]
    pub max_readings: u64,

    /// Run time limit in seconds (0 = no limit)
    #[arg(long, default_value = "0", env = "SMARTMETER_TIMEOUT")]
    pub timeout: u64,

    /// Channel buffer size for internal queues
    #[arg(long, default_value = "100", env = "SMARTMETER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "SMARTMETER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Log load commands instead of switching hardware
    #[arg(long)]
    pub dry_run: bool,

    /// sysfs GPIO root used by the aux load
    #[arg(long, default_value = load_control::DEFAULT_GPIO_ROOT, env = "SMARTMETER_GPIO_ROOT")]
    pub gpio_root: PathBuf,

    /// Also log every reading
    #[arg(long)]
    pub log_readings: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "smartmeter.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "smartmeter.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show load configuration
    #[arg(long)]
    pub loads: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Arguments for the `upload` command
#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "smartmeter.toml", env = "SMARTMETER_CONFIG")]
    pub config: PathBuf,

    /// Directory to upload from (default: `[csv] file_path`)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Bucket name (default: `[upload] bucket`)
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Store host or URL (default: `[upload] endpoint`)
    #[arg(short = 'H', long)]
    pub endpoint: Option<String>,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for contracts::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
