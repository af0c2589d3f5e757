//! TOML parsing, serialization and validation for configurations.
//!
//! Configurations are stored as `.regmap.toml` files. Every key is optional;
//! omitted keys take the values of [`Configuration::default`].

use std::path::Path;

use crate::config::Configuration;
use crate::error::{ConfigError, Result};

/// A validation issue found in a configuration.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Load a configuration from a `.regmap.toml` file.
pub fn load_config(path: &Path) -> Result<Configuration> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    log::debug!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse a configuration from a TOML string.
pub fn parse_config(toml_str: &str) -> Result<Configuration> {
    let config: Configuration = toml::from_str(toml_str)?;
    Ok(config)
}

/// Serialize a configuration to pretty TOML.
pub fn config_to_toml(config: &Configuration) -> Result<String> {
    let toml_str = toml::to_string_pretty(config)?;
    Ok(toml_str)
}

/// Validate a configuration for structural correctness.
///
/// Returns `Ok(())` if valid, or `Err(issues)` with every problem found.
pub fn validate_config(config: &Configuration) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // 1. Bus width is a power of 2 and at least one byte
    if config.bus_width < 8 || !config.bus_width.is_power_of_two() {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!(
                "bus width {} is not a power of 2 greater than or equal to 8",
                config.bus_width
            ),
        });
    }

    // 2. Address width can address at least one bus word and fits in u64
    let byte_offset_bits = (config.bus_width / 8).max(1).trailing_zeros();
    if config.address_width < byte_offset_bits || config.address_width > 64 {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!(
                "address width {} is out of range ({}..=64)",
                config.address_width, byte_offset_bits
            ),
        });
    }

    // 3. A bus wider than 64 bits makes every register wide
    if config.bus_width > 64 && !config.enable_wide_register {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!(
                "bus width {} requires enable-wide-register",
                config.bus_width
            ),
        });
    }

    // 4. Enabled type list is non-empty and has no duplicates
    if let Some(names) = &config.enabled_types {
        if names.is_empty() {
            issues.push(ValidationIssue {
                severity: "warning",
                message: "enabled-types is empty; no type can be used".into(),
            });
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                issues.push(ValidationIssue {
                    severity: "warning",
                    message: format!("type '{name}' is enabled more than once"),
                });
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

impl Configuration {
    /// Validate and return the configuration, failing on the first error-severity issue.
    ///
    /// Warnings are logged and otherwise ignored.
    pub fn checked(self) -> Result<Self> {
        if let Err(issues) = validate_config(&self) {
            for issue in &issues {
                if issue.severity == "warning" {
                    log::warn!("configuration: {}", issue.message);
                }
            }
            if let Some(error) = issues.iter().find(|i| i.severity == "error") {
                return Err(ConfigError::Validation {
                    detail: error.message.clone(),
                });
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitAssignmentFormat;

    #[test]
    fn round_trip_default() {
        let original = Configuration::default();
        let toml_str = config_to_toml(&original).unwrap();
        let parsed = parse_config(&toml_str).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn round_trip_customized() {
        let original = Configuration::default()
            .with_bus_width(64)
            .with_address_width(16)
            .with_wide_register(true)
            .with_bit_assignment_format(BitAssignmentFormat::LsbWidth)
            .with_enabled_types(["rw", "ro", "indirect"]);
        let toml_str = config_to_toml(&original).unwrap();
        let parsed = parse_config(&toml_str).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
bus-width = 16
bit-assignment-format = "lsb-width"
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.bus_width, 16);
        assert_eq!(config.address_width, 32);
        assert_eq!(config.bit_assignment_format, BitAssignmentFormat::LsbWidth);
    }

    #[test]
    fn parse_invalid_returns_error() {
        assert!(parse_config("bus-width = [[[").is_err());
        assert!(parse_config("bit-assignment-format = \"msb-first\"").is_err());
    }

    #[test]
    fn validate_default() {
        assert!(validate_config(&Configuration::default()).is_ok());
    }

    #[test]
    fn validate_bad_bus_width() {
        let config = Configuration::default().with_bus_width(24);
        let issues = validate_config(&config).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("bus width 24")));

        let config = Configuration::default().with_bus_width(4);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validate_bad_address_width() {
        let config = Configuration::default().with_address_width(1);
        let issues = validate_config(&config).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("address width 1")));

        let config = Configuration::default().with_address_width(65);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validate_wide_bus_needs_wide_registers() {
        let config = Configuration::default().with_bus_width(128);
        let issues = validate_config(&config).unwrap_err();
        assert!(issues
            .iter()
            .any(|i| i.message.contains("enable-wide-register")));

        let config = config.with_wide_register(true);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn validate_duplicate_enabled_types() {
        let config = Configuration::default().with_enabled_types(["rw", "rw"]);
        let issues = validate_config(&config).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, "warning");
    }

    #[test]
    fn checked_rejects_errors_only() {
        assert!(Configuration::default()
            .with_enabled_types(["rw", "rw"])
            .checked()
            .is_ok());
        let err = Configuration::default().with_bus_width(12).checked().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn load_not_found() {
        let result = load_config(Path::new("/nonexistent/path.regmap.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::NotFound { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soc.regmap.toml");
        std::fs::write(&path, "bus-width = 64\nenable-wide-register = true\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.bus_width, 64);
        assert!(config.enable_wide_register);
    }
}
