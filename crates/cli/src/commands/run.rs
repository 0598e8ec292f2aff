//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::ApplianceConfig;
use load_control::ActuatorOptions;
use observability::{LogOverrides, ObservabilityConfig};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig, SourceSpec};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs, overrides: LogOverrides) -> Result<()> {
    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let appliance = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let observability = ObservabilityConfig::from_logging(&appliance.logging)
        .with_overrides(overrides)
        .with_metrics_port(Some(args.metrics_port));
    observability::init_with_config(&observability)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        loads = appliance.enabled_loads().count(),
        sinks = appliance.enabled_sink_count(),
        "Smartmeter starting"
    );

    let pipeline_config = build_pipeline_config(args, appliance)?;
    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        readings = stats.readings,
        duration_secs = stats.duration.as_secs_f64(),
        interrupted = stats.interrupted,
        "Pipeline finished"
    );
    stats.print_summary();

    Ok(())
}

fn build_pipeline_config(args: &RunArgs, appliance: ApplianceConfig) -> Result<PipelineConfig, CliError> {
    let source = match (&args.replay, args.mock) {
        (Some(path), _) => {
            if !args.replay_speed.is_finite() || args.replay_speed < 0.0 {
                return Err(CliError::invalid_argument("--replay-speed", "must be zero or positive"));
            }
            SourceSpec::Replay {
                path: path.clone(),
                speed: args.replay_speed,
                looped: args.replay_loop,
            }
        }
        (None, true) => {
            if args.mock_period == 0 {
                return Err(CliError::invalid_argument("--mock-period", "must be at least 1 second"));
            }
            SourceSpec::Mock {
                profile: args.mock_profile.clone(),
                period: Duration::from_secs(args.mock_period),
            }
        }
        (None, false) => return Err(CliError::NoSource),
    };

    if args.buffer_size == 0 {
        return Err(CliError::invalid_argument("--buffer-size", "must be at least 1"));
    }

    Ok(PipelineConfig {
        appliance,
        source,
        max_readings: (args.max_readings > 0).then_some(args.max_readings),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        actuator: ActuatorOptions {
            gpio_root: args.gpio_root.clone(),
            dry_run: args.dry_run,
        },
        log_readings: args.log_readings,
    })
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["smartmeter", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_source_is_required() {
        let err = build_pipeline_config(&run_args(&[]), ApplianceConfig::default()).unwrap_err();
        assert!(matches!(err, CliError::NoSource));
    }

    #[test]
    fn test_mock_source_config() {
        let args = run_args(&["--mock", "--mock-period", "2", "--max-readings", "10", "--dry-run"]);
        let config = build_pipeline_config(&args, ApplianceConfig::default()).unwrap();

        assert!(matches!(
            config.source,
            SourceSpec::Mock { period, .. } if period == Duration::from_secs(2)
        ));
        assert_eq!(config.max_readings, Some(10));
        assert_eq!(config.timeout, None);
        assert!(config.actuator.dry_run);
    }

    #[test]
    fn test_negative_replay_speed_rejected() {
        let args = run_args(&["--replay", "x.ndjson", "--replay-speed", "-1"]);
        let err = build_pipeline_config(&args, ApplianceConfig::default()).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { name: "--replay-speed", .. }));
    }
}
