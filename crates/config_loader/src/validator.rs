//! Configuration validation
//!
//! Rules:
//! - load: max_power > 0, thresholds within 0..=100, switch_off <= switch_on
//! - load: every section except `aux` needs an address
//! - enabled sinks have their required keys
//! - serial line settings are in range
//! - loglevel is a known level
//! - an enabled upload names its bucket and region

use contracts::{
    ApplianceConfig, ContractError, CsvConfig, InfluxConfig, LoadConfig, LoggingConfig,
    SerialConfig, TelegramConfig, UploadConfig, AUX_LOAD_NAME,
};
use ::validator::{Validate, ValidationErrors};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const PARITIES: [&str; 5] = ["N", "E", "O", "M", "S"];

/// Validate an ApplianceConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &ApplianceConfig) -> Result<(), ContractError> {
    validate_logging(&config.logging)?;
    validate_serial(&config.digimeter)?;
    validate_telegram(&config.telegram)?;
    validate_influx(&config.influx)?;
    validate_csv(&config.csv)?;
    validate_upload(&config.upload)?;
    for (name, load) in &config.loads {
        validate_load(name, load)?;
    }
    Ok(())
}

/// Map the first derive-level violation to a ContractError
fn first_violation(prefix: &str, errors: &ValidationErrors) -> ContractError {
    let mut violations: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "invalid value".to_string());
            (field.to_string(), message)
        })
        .collect();
    violations.sort();

    match violations.into_iter().next() {
        Some((field, message)) => {
            ContractError::config_validation(format!("{prefix}.{field}"), message)
        }
        None => ContractError::config_validation(prefix, errors.to_string()),
    }
}

fn require(field: &str, value: &str) -> Result<(), ContractError> {
    if value.trim().is_empty() {
        return Err(ContractError::config_validation(field, "value cannot be empty"));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ContractError> {
    let level = logging.loglevel.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ContractError::config_validation(
            "logging.loglevel",
            format!(
                "unknown level '{}', expected one of {:?}",
                logging.loglevel, LOG_LEVELS
            ),
        ));
    }
    require("logging.logfile", &logging.logfile)
}

fn validate_serial(serial: &SerialConfig) -> Result<(), ContractError> {
    serial
        .validate()
        .map_err(|e| first_violation("digimeter", &e))?;

    if !PARITIES.contains(&serial.parity.to_uppercase().as_str()) {
        return Err(ContractError::config_validation(
            "digimeter.parity",
            format!("unknown parity '{}', expected one of {:?}", serial.parity, PARITIES),
        ));
    }
    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ContractError> {
    if !telegram.enabled {
        return Ok(());
    }
    require("telegram.token", &telegram.token)?;
    require("telegram.chat_id", &telegram.chat_id)
}

fn validate_influx(influx: &InfluxConfig) -> Result<(), ContractError> {
    if !influx.enabled {
        return Ok(());
    }
    require("influx.url", &influx.url)?;
    require("influx.token", &influx.token)?;
    require("influx.org", &influx.org)?;
    require("influx.bucket", &influx.bucket)?;

    if !(influx.url.starts_with("http://") || influx.url.starts_with("https://")) {
        return Err(ContractError::config_validation(
            "influx.url",
            format!("url must start with http:// or https://, got '{}'", influx.url),
        ));
    }
    if influx.buffer_capacity == 0 {
        return Err(ContractError::config_validation(
            "influx.buffer_capacity",
            "buffer_capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_csv(csv: &CsvConfig) -> Result<(), ContractError> {
    if !csv.enabled {
        return Ok(());
    }
    require("csv.file_prefix", &csv.file_prefix)?;
    if csv.file_path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "csv.file_path",
            "value cannot be empty",
        ));
    }
    if csv.write_every == 0 {
        return Err(ContractError::config_validation(
            "csv.write_every",
            "write_every must be >= 1",
        ));
    }
    Ok(())
}

fn validate_upload(upload: &UploadConfig) -> Result<(), ContractError> {
    if !upload.enabled {
        return Ok(());
    }
    require("upload.bucket", &upload.bucket)?;
    require("upload.region", &upload.region)?;
    let endpoint = upload.endpoint.trim();
    if endpoint.contains("://") && !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ContractError::config_validation(
            "upload.endpoint",
            format!("endpoint must be a host or an http(s) URL, got '{}'", upload.endpoint),
        ));
    }
    Ok(())
}

/// Validate one `[loads.<name>]` section (disabled sections included)
fn validate_load(name: &str, load: &LoadConfig) -> Result<(), ContractError> {
    let prefix = format!("loads.{name}");

    load.validate().map_err(|e| first_violation(&prefix, &e))?;

    if load.switch_off > load.switch_on {
        return Err(ContractError::config_validation(
            format!("{prefix}.switch_off"),
            format!(
                "switch_off ({}) must be <= switch_on ({})",
                load.switch_off, load.switch_on
            ),
        ));
    }

    if name != AUX_LOAD_NAME {
        let has_address = load
            .address
            .as_deref()
            .is_some_and(|address| !address.trim().is_empty());
        if !has_address {
            return Err(ContractError::config_validation(
                format!("{prefix}.address"),
                "address is required for loads other than 'aux'",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn aux_load() -> LoadConfig {
        LoadConfig {
            enabled: true,
            max_power: 2300,
            switch_on: 75,
            switch_off: 10,
            hold_timer: 10,
            address: None,
            gpio_pin: None,
        }
    }

    fn minimal_config() -> ApplianceConfig {
        let mut cfg = ApplianceConfig::default();
        cfg.csv.enabled = true;
        cfg.csv.file_path = PathBuf::from("/tmp/meter");
        cfg.loads.insert("aux".into(), aux_load());
        cfg
    }

    #[test]
    fn test_valid_config() {
        let cfg = minimal_config();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_zero_max_power() {
        let mut cfg = minimal_config();
        cfg.loads.get_mut("aux").unwrap().max_power = 0;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("max_power must be > 0"), "got: {err}");
        assert!(err.contains("loads.aux.max_power"), "got: {err}");
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut cfg = minimal_config();
        cfg.loads.get_mut("aux").unwrap().switch_on = 120;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("switch_on must be between 0 and 100"), "got: {err}");
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut cfg = minimal_config();
        let load = cfg.loads.get_mut("aux").unwrap();
        load.switch_on = 10;
        load.switch_off = 75;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("must be <= switch_on"), "got: {err}");
    }

    #[test]
    fn test_equal_thresholds_accepted() {
        let mut cfg = minimal_config();
        let load = cfg.loads.get_mut("aux").unwrap();
        load.switch_on = 50;
        load.switch_off = 50;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_addressed_load_requires_address() {
        let mut cfg = minimal_config();
        cfg.loads.insert("boiler".into(), aux_load());
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("loads.boiler.address"), "got: {err}");

        cfg.loads.get_mut("boiler").unwrap().address = Some("10.0.0.7".into());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_disabled_load_still_validated() {
        let mut cfg = minimal_config();
        let load = cfg.loads.get_mut("aux").unwrap();
        load.enabled = false;
        load.max_power = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_enabled_influx_requires_keys() {
        let mut cfg = minimal_config();
        cfg.influx.enabled = true;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("influx.url"), "got: {err}");

        cfg.influx.url = "localhost:8086".into();
        cfg.influx.token = "t".into();
        cfg.influx.org = "home".into();
        cfg.influx.bucket = "meter".into();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("http://"), "got: {err}");

        cfg.influx.url = "https://influx.local:8086".into();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_disabled_sink_not_checked() {
        let mut cfg = minimal_config();
        cfg.csv.enabled = false;
        cfg.csv.file_path = PathBuf::new();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_csv_write_every_zero() {
        let mut cfg = minimal_config();
        cfg.csv.write_every = 0;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("write_every"), "got: {err}");
    }

    #[test]
    fn test_telegram_requires_chat_id() {
        let mut cfg = minimal_config();
        cfg.telegram.enabled = true;
        cfg.telegram.token = "123:abc".into();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("telegram.chat_id"), "got: {err}");
    }

    #[test]
    fn test_serial_ranges() {
        let mut cfg = minimal_config();
        cfg.digimeter.bytesize = 9;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("bytesize"), "got: {err}");

        let mut cfg = minimal_config();
        cfg.digimeter.parity = "X".into();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("parity"), "got: {err}");
    }

    #[test]
    fn test_unknown_loglevel() {
        let mut cfg = minimal_config();
        cfg.logging.loglevel = "verbose".into();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("logging.loglevel"), "got: {err}");
    }

    #[test]
    fn test_enabled_upload_requires_bucket() {
        let mut cfg = minimal_config();
        cfg.upload.enabled = true;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("upload.bucket"), "got: {err}");

        cfg.upload.bucket = "meter-archive".into();
        cfg.upload.endpoint = "ftp://store.local".into();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("upload.endpoint"), "got: {err}");

        cfg.upload.endpoint = "store.local:9000".into();
        assert!(validate(&cfg).is_ok());
    }
}
