//! Replay of recorded readings
//!
//! Reads one JSON `Reading` per line. Blank lines are skipped, a line that
//! does not decode is reported as a source error and skipped on the next call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use contracts::{ContractError, Reading, ReadingSource};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};

/// Longest pause between two replayed readings
pub const MAX_REPLAY_WAIT: Duration = Duration::from_secs(3600);

/// Reading source backed by an NDJSON file
pub struct ReplaySource {
    name: String,
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    /// Playback speed factor, 0 = as fast as possible
    speed: f64,
    looping: bool,
    line_no: usize,
    yielded_in_pass: usize,
    last_timestamp: Option<DateTime<FixedOffset>>,
}

impl ReplaySource {
    /// Open a replay file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lines = Self::open_lines(&path).await?;
        let name = format!("replay:{}", path.display());

        Ok(Self {
            name,
            path,
            lines,
            speed: 0.0,
            looping: false,
            line_no: 0,
            yielded_in_pass: 0,
            last_timestamp: None,
        })
    }

    /// Pace readings by their timestamp difference divided by `speed`
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(0.0);
        self
    }

    /// Start over at end of file instead of ending the stream
    pub fn with_loop(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    async fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>> {
        let file = File::open(path)
            .await
            .map_err(|source| IngestionError::ReplayOpen {
                path: path.display().to_string(),
                source,
            })?;
        Ok(BufReader::new(file).lines())
    }

    async fn rewind(&mut self) -> std::result::Result<(), ContractError> {
        self.lines = Self::open_lines(&self.path)
            .await
            .map_err(|e| ContractError::source(&self.name, e.to_string()))?;
        self.line_no = 0;
        self.yielded_in_pass = 0;
        self.last_timestamp = None;
        debug!(source = %self.name, "replay restarted");
        Ok(())
    }

    async fn pace(&mut self, timestamp: DateTime<FixedOffset>) {
        if self.speed > 0.0 {
            if let Some(previous) = self.last_timestamp {
                let gap_secs = (timestamp - previous).num_milliseconds() as f64 / 1000.0;
                if gap_secs > 0.0 {
                    let wait = Duration::try_from_secs_f64(gap_secs / self.speed)
                        .map_or(MAX_REPLAY_WAIT, |wait| wait.min(MAX_REPLAY_WAIT));
                    tokio::time::sleep(wait).await;
                }
            }
        }
        self.last_timestamp = Some(timestamp);
    }
}

impl ReadingSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn next_reading(&mut self) -> std::result::Result<Option<Reading>, ContractError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ContractError::source(&self.name, e.to_string()))?;

            let Some(line) = line else {
                if self.looping && self.yielded_in_pass > 0 {
                    self.rewind().await?;
                    continue;
                }
                debug!(source = %self.name, lines = self.line_no, "replay finished");
                return Ok(None);
            };

            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let reading: Reading = serde_json::from_str(line).map_err(|e| {
                ContractError::source(&self.name, format!("line {}: {e}", self.line_no))
            })?;

            self.pace(reading.timestamp).await;
            self.yielded_in_pass += 1;
            trace!(source = %self.name, line = self.line_no, power_w = reading.power_w, "replayed");
            return Ok(Some(reading));
        }
    }
}
