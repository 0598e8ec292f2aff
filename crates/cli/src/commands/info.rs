//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{ApplianceConfig, DispatchMode, AUX_LOAD_NAME, DEFAULT_AUX_GPIO_PIN};
use dispatcher::DispatcherConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    serial: SerialInfo,
    logging: LoggingInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    loads: Vec<LoadInfo>,
}

#[derive(Serialize)]
struct SerialInfo {
    port: String,
    settings: String,
}

#[derive(Serialize)]
struct LoggingInfo {
    level: String,
    file: String,
    keep: u32,
    max_size_bytes: u64,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    enabled: bool,
    /// "immediate" or "every <n>s"
    mode: String,
    queue_capacity: usize,
    buffer_capacity: usize,
}

#[derive(Serialize)]
struct LoadInfo {
    name: String,
    enabled: bool,
    max_power_w: u32,
    switch_on_pct: u8,
    switch_off_pct: u8,
    hold_timer_secs: u64,
    actuator: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config, args);
    if args.json {
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{json}");
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &ApplianceConfig, args: &InfoArgs) -> ConfigInfo {
    let serial = &config.digimeter;

    let sinks = if args.sinks {
        DispatcherConfig::from_appliance(config)
            .sinks
            .iter()
            .map(|spec| {
                let settings = spec.settings();
                SinkInfo {
                    mode: match settings.mode() {
                        DispatchMode::Immediate => "immediate".to_string(),
                        DispatchMode::Interval(period) => format!("every {}s", period.as_secs()),
                    },
                    name: settings.name,
                    enabled: settings.enabled,
                    queue_capacity: settings.queue_capacity,
                    buffer_capacity: settings.buffer_capacity,
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    let loads = if args.loads {
        config
            .loads
            .iter()
            .map(|(name, load)| LoadInfo {
                name: name.clone(),
                enabled: load.enabled,
                max_power_w: load.max_power,
                switch_on_pct: load.switch_on,
                switch_off_pct: load.switch_off,
                hold_timer_secs: load.hold_timer,
                actuator: if name == AUX_LOAD_NAME {
                    format!("gpio{}", load.gpio_pin.unwrap_or(DEFAULT_AUX_GPIO_PIN))
                } else {
                    load.address.clone().unwrap_or_else(|| "-".to_string())
                },
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        serial: SerialInfo {
            port: serial.port.clone(),
            settings: format!(
                "{} {}{}{}",
                serial.baudrate, serial.bytesize, serial.parity, serial.stopbits
            ),
        },
        logging: LoggingInfo {
            level: config.logging.loglevel.clone(),
            file: config.logging.log_file_path().display().to_string(),
            keep: config.logging.keep,
            max_size_bytes: config.logging.size.as_u64(),
        },
        sinks,
        loads,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== Smartmeter Configuration ===\n");

    println!("Meter");
    println!("  Port: {} ({})", info.serial.port, info.serial.settings);

    println!("\nLogging");
    println!("  Level: {}", info.logging.level);
    println!(
        "  File: {} (keep {}, rotate above {} bytes)",
        info.logging.file, info.logging.keep, info.logging.max_size_bytes
    );

    if !info.sinks.is_empty() {
        println!("\nSinks");
        for sink in &info.sinks {
            let state = if sink.enabled { "enabled" } else { "disabled" };
            println!(
                "  {}: {state}, {} (queue {}, buffer {})",
                sink.name, sink.mode, sink.queue_capacity, sink.buffer_capacity
            );
        }
    }

    if !info.loads.is_empty() {
        println!("\nLoads");
        for load in &info.loads {
            let state = if load.enabled { "enabled" } else { "disabled" };
            println!(
                "  {}: {state}, {} W, on at {}%, off at {}%, hold {}s, {}",
                load.name,
                load.max_power_w,
                load.switch_on_pct,
                load.switch_off_pct,
                load.hold_timer_secs,
                load.actuator
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_sections_only_when_requested() {
        let config = ApplianceConfig::default();
        let args = InfoArgs {
            config: PathBuf::from("unused.toml"),
            json: true,
            loads: false,
            sinks: true,
        };

        let info = build_config_info(&config, &args);
        assert!(info.loads.is_empty());
        let names: Vec<_> = info.sinks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["csv", "influx", "telegram"]);
        let telegram = &info.sinks[2];
        assert_eq!(telegram.mode, "every 3600s");
        assert_eq!(info.sinks[0].mode, "immediate");
    }
}
