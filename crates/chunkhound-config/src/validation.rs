//! Configuration validation framework

use crate::{ConfigError, ConfigResult};

/// Trait for validating configuration values
pub trait Validate {
    /// Validate this configuration object
    ///
    /// # Errors
    /// Returns validation errors if the configuration is invalid
    fn validate(&self) -> ConfigResult<()>;
}

/// Validate a port number
///
/// # Errors
/// Returns `ConfigError::InvalidPort` if port is 0
pub const fn validate_port(port: u16, _field_name: &str) -> ConfigResult<()> {
    if port == 0 {
        Err(ConfigError::InvalidPort { port })
    } else {
        Ok(())
    }
}

/// Validate a value is within a range
///
/// # Errors
/// Returns `ConfigError::OutOfRange` if value is outside the specified range
pub fn validate_range(value: u64, min: u64, max: u64, field_name: &str) -> ConfigResult<()> {
    if value < min || value > max {
        Err(ConfigError::OutOfRange {
            field: field_name.to_string(),
            value,
            min,
            max,
        })
    } else {
        Ok(())
    }
}

/// Validate a string is not empty
///
/// # Errors
/// Returns `ConfigError::MissingField` if the string is empty or whitespace-only
pub fn validate_non_empty(value: &str, field_name: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField {
            field: field_name.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_zero_is_invalid() {
        assert!(validate_port(0, "port").is_err());
        assert!(validate_port(7749, "port").is_ok());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        assert!(validate_range(1, 1, 10, "x").is_ok());
        assert!(validate_range(10, 1, 10, "x").is_ok());
        assert!(validate_range(0, 1, 10, "x").is_err());
        assert!(validate_range(11, 1, 10, "x").is_err());
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(validate_non_empty("   ", "field").is_err());
        assert!(validate_non_empty("value", "field").is_ok());
    }
}
