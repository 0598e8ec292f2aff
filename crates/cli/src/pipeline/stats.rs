//! Pipeline statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MeterSummary;
use uploader::UploadReport;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Readings handed to the dispatcher
    pub readings: u64,

    /// Readings the dispatcher fanned out
    pub dispatched: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Stopped by Ctrl+C / SIGTERM
    pub interrupted: bool,

    /// Stopped by the run time limit
    pub timed_out: bool,

    /// Meter statistics and final load states
    pub meter: MeterSummary,

    /// Final metrics per sink
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Sinks aborted at shutdown
    pub sink_timeouts: Vec<String>,

    pub ingestion: ingestion::MetricsSnapshot,

    /// Files moved to the object store, when periodic upload is on
    pub upload: Option<UploadReport>,
}

impl PipelineStats {
    pub fn readings_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.readings as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Readings lost before reaching the dispatcher, as percentage
    pub fn ingestion_drop_rate(&self) -> f64 {
        let total = self.ingestion.readings_received;
        if total > 0 {
            self.ingestion.readings_dropped as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");
        println!("Overview");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Readings: {} ({:.2}/s)", self.readings, self.readings_per_sec());
        println!("  Dispatched: {}", self.dispatched);
        if self.interrupted {
            println!("  Stopped by signal");
        } else if self.timed_out {
            println!("  Stopped by time limit");
        }

        println!("\nIngestion");
        println!("  Received: {}", self.ingestion.readings_received);
        println!(
            "  Dropped: {} ({:.2}%)",
            self.ingestion.readings_dropped,
            self.ingestion_drop_rate()
        );
        println!("  Source errors: {}", self.ingestion.source_errors);

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (name, m) in &self.sinks {
                let aborted = if self.sink_timeouts.contains(name) { " [aborted]" } else { "" };
                println!(
                    "  {name}: delivered={} failed={} dropped={} evicted={}{aborted}",
                    m.delivered_count, m.failure_count, m.dropped_count, m.evicted_count
                );
            }
        }

        if let Some(upload) = &self.upload {
            println!("\nUpload");
            println!(
                "  uploaded={} failed={} bytes={}",
                upload.uploaded, upload.failed, upload.bytes
            );
        }

        println!("\n{}", self.meter);
    }
}
