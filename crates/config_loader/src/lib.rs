//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality (fail fast, nothing starts on error)
//! - Produce an `ApplianceConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("smartmeter.toml")).unwrap();
//! println!("Loads: {}", config.loads.len());
//! ```

mod parser;
mod validator;

pub use contracts::ApplianceConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ApplianceConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ApplianceConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already constructed configuration
    pub fn validate(config: &ApplianceConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize ApplianceConfig to TOML string
    pub fn to_toml(config: &ApplianceConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ApplianceConfig to JSON string
    pub fn to_json(config: &ApplianceConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ApplianceConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
[logging]
loglevel = "debug"
logpath = "/var/log/smartmeter"
keep = 2
size = "1M"
log_to_stdout = true

[digimeter]
port = "/dev/ttyUSB0"
baudrate = 115200
bytesize = 8
parity = "N"
stopbits = 1

[telegram]
enabled = false

[influx]
enabled = true
url = "https://influx.local:8086"
token = "secret"
org = "home"
bucket = "smartmeter"
upload_interval = 10

[csv]
enabled = true
file_prefix = "meter"
file_path = "/data/csv"
max_lines = 100
max_age = 300

[loads.aux]
enabled = true
max_power = 2300
switch_on = 75
switch_off = 10
hold_timer = 10
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let cfg = result.unwrap();
        assert_eq!(cfg.logging.loglevel, "debug");
        assert_eq!(cfg.influx.upload_interval, 10);
        assert_eq!(cfg.csv.write_every, 30);
        assert_eq!(cfg.enabled_sink_count(), 2);
    }

    #[test]
    fn test_round_trip_toml() {
        let cfg = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&cfg).unwrap();
        let cfg2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(cfg.loads, cfg2.loads);
        assert_eq!(cfg.logging.size, cfg2.logging.size);
        assert_eq!(cfg.csv.file_path, cfg2.csv.file_path);
    }

    #[test]
    fn test_round_trip_json() {
        let cfg = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&cfg).unwrap();
        let cfg2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(cfg.influx.bucket, cfg2.influx.bucket);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = SAMPLE_TOML.replace("switch_off = 10", "switch_off = 90");
        let result = ConfigLoader::load_from_str(&content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("switch_off"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smartmeter.toml");
        std::fs::write(&path, SAMPLE_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&path).is_ok());

        let ini = dir.path().join("smartmeter.ini");
        std::fs::write(&ini, SAMPLE_TOML).unwrap();
        let err = ConfigLoader::load_from_path(&ini).unwrap_err().to_string();
        assert!(err.contains("unsupported config format"), "got: {err}");
    }
}
