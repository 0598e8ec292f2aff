//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::ApplianceConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    serial_port: String,
    enabled_sinks: usize,
    enabled_loads: Vec<String>,
    log_file: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: Vec::new(),
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&config),
            summary: Some(ConfigSummary {
                serial_port: config.digimeter.port.clone(),
                enabled_sinks: config.enabled_sink_count(),
                enabled_loads: config.enabled_loads().map(|(name, _)| name.clone()).collect(),
                log_file: config.logging.log_file_path().display().to_string(),
            }),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
pub(crate) fn collect_warnings(config: &ApplianceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.enabled_sink_count() == 0 {
        warnings.push("No sinks enabled - readings are only used for load control".to_string());
    }

    if config.enabled_loads().next().is_none() {
        warnings.push("No loads enabled - surplus power is not used".to_string());
    }

    if config.influx.enabled && !config.influx.verify_ssl {
        warnings.push("influx.verify_ssl is false - server certificates are not checked".to_string());
    }

    if config.csv.enabled && config.csv.max_lines == 0 && config.csv.max_age == 0 {
        warnings.push("csv.max_lines and csv.max_age are 0 - the CSV file is never rotated".to_string());
    }

    if config.upload.period().is_some() && !config.csv.enabled {
        warnings.push("upload.interval is set but the CSV sink is disabled - nothing new to upload".to_string());
    }

    for (name, load) in config.enabled_loads() {
        if load.switch_on == load.switch_off {
            warnings.push(format!(
                "Load '{name}' switches on and off at the same threshold ({}%)",
                load.switch_on
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Serial port: {}", summary.serial_port);
            println!("  Enabled sinks: {}", summary.enabled_sinks);
            println!("  Enabled loads: {}", summary.enabled_loads.join(", "));
            println!("  Log file: {}", summary.log_file);
        }

        if !result.warnings.is_empty() {
            println!("\nWarnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::LoadConfig;

    #[test]
    fn test_default_config_warnings() {
        let warnings = collect_warnings(&ApplianceConfig::default());
        assert!(warnings.iter().any(|w| w.starts_with("No sinks enabled")));
        assert!(warnings.iter().any(|w| w.starts_with("No loads enabled")));
    }

    #[test]
    fn test_insecure_influx_and_unrotated_csv() {
        let mut config = ApplianceConfig::default();
        config.influx.enabled = true;
        config.influx.verify_ssl = false;
        config.csv.enabled = true;
        config.csv.max_lines = 0;
        config.csv.max_age = 0;
        config.loads.insert(
            "aux".to_string(),
            LoadConfig {
                enabled: true,
                max_power: 500,
                switch_on: 50,
                switch_off: 50,
                hold_timer: 0,
                address: None,
                gpio_pin: Some(24),
            },
        );

        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("verify_ssl")));
        assert!(warnings.iter().any(|w| w.contains("never rotated")));
        assert!(warnings.iter().any(|w| w.contains("same threshold (50%)")));
    }

    #[test]
    fn test_periodic_upload_without_csv() {
        let mut config = ApplianceConfig::default();
        config.upload.enabled = true;
        config.upload.interval = 600;
        let warnings = collect_warnings(&config);
        assert!(warnings.iter().any(|w| w.starts_with("upload.interval")));

        config.csv.enabled = true;
        let warnings = collect_warnings(&config);
        assert!(!warnings.iter().any(|w| w.starts_with("upload.interval")));
    }
}
