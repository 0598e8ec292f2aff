//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig, SourceSpec};
pub use stats::PipelineStats;
