//! Tracing subscriber setup and log file rotation

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use contracts::{LogFormat, LoggingConfig};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Command line adjustments on top of `[logging]`
#[derive(Debug, Clone, Default)]
pub struct LogOverrides {
    /// Replaces `loglevel` (still loses against `RUST_LOG`)
    pub level: Option<String>,
    pub format: Option<LogFormat>,
    /// Skip the log file even when configured
    pub no_file: bool,
}

impl LogOverrides {
    /// Level for `-v`/`-q` counts; `None` keeps the configured level
    pub fn level_from_verbosity(verbose: u8, quiet: u8) -> Option<String> {
        let level = match (verbose, quiet) {
            (0, 0) => return None,
            (0, 1) => "warn",
            (0, _) => "error",
            (1, _) => "debug",
            _ => "trace",
        };
        Some(level.to_string())
    }
}

/// Filter directive in order of precedence: `RUST_LOG`, override, config
pub fn filter_directive(rust_log: Option<&str>, overrides: &LogOverrides, config: &LoggingConfig) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| overrides.level.clone())
        .unwrap_or_else(|| config.loglevel.clone())
}

/// Rotate `path` into `path.1` .. `path.<keep>` when it exceeds `max_size`
///
/// Returns true when the file was rotated. With `keep = 0` the oversized file
/// is simply removed.
pub fn rotate_log_file(path: &Path, max_size: u64, keep: u32) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if max_size == 0 || size <= max_size {
        return Ok(false);
    }

    shift_backups(path, keep)?;
    Ok(true)
}

/// Move `path` to `path.1`, shifting older backups up to `path.<keep>`
fn shift_backups(path: &Path, keep: u32) -> io::Result<()> {
    if keep == 0 {
        return fs::remove_file(path);
    }

    let backup = |n: u32| -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    };

    let oldest = backup(keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = backup(n);
        if from.exists() {
            fs::rename(&from, backup(n + 1))?;
        }
    }
    fs::rename(path, backup(1))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log file that rotates itself once a write would push it past `max_size`
///
/// Used as the `MakeWriter` of the file layer. A single event is never split
/// across two files; an event larger than `max_size` gets a file of its own.
#[derive(Debug)]
pub struct RotatingFile {
    state: Mutex<RotatingState>,
}

#[derive(Debug)]
struct RotatingState {
    path: PathBuf,
    file: File,
    written: u64,
    max_size: u64,
    keep: u32,
}

impl RotatingFile {
    /// Open `path` for appending; `max_size = 0` disables rotation
    pub fn open(path: impl Into<PathBuf>, max_size: u64, keep: u32) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            state: Mutex::new(RotatingState {
                path,
                file,
                written,
                max_size,
                keep,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotatingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RotatingState {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        shift_backups(&self.path, self.keep)?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// Writer for one event, holding the file lock until dropped
pub struct RotatingWriter<'a> {
    state: MutexGuard<'a, RotatingState>,
}

impl Write for RotatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let state = &mut *self.state;
        if state.max_size > 0 && state.written > 0 && state.written + buf.len() as u64 > state.max_size {
            state.rotate()?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriter { state: self.lock() }
    }
}

fn fmt_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Json => layer
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn open_log_file(config: &LoggingConfig) -> Result<(RotatingFile, PathBuf)> {
    let path = config.log_file_path();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    rotate_log_file(&path, config.size.as_u64(), config.keep)
        .with_context(|| format!("Failed to rotate log file {}", path.display()))?;
    let file = RotatingFile::open(&path, config.size.as_u64(), config.keep)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok((file, path))
}

/// Install the global tracing subscriber
///
/// Writes to stdout when `log_to_stdout` is set and to the configured log
/// file unless `overrides.no_file`. Returns the log file path in use.
pub fn init_logging(config: &LoggingConfig, overrides: &LogOverrides) -> Result<Option<PathBuf>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), overrides, config);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{directive}'"))?;
    let format = overrides.format.unwrap_or(config.format);

    let mut layers = Vec::new();
    if config.log_to_stdout {
        layers.push(fmt_layer(format, io::stdout, true));
    }

    let mut log_path = None;
    if !overrides.no_file {
        let (file, path) = open_log_file(config)?;
        layers.push(fmt_layer(format, file, false));
        log_path = Some(path);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        filter = %directive,
        log_format = ?format,
        log_file = ?log_path,
        "Logging initialized"
    );
    Ok(log_path)
}
