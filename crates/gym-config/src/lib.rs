//! Configuration parsing and validation for gymd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service paths
//! - Booking policy (lock timeout, timeout refund policy, past dates)
//! - Sweep intervals
//! - The trainer registry
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<FacilityPolicy> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Reading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<FacilityPolicy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(FacilityPolicy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let policy = parse_config("config_version = 1").unwrap();
        assert!(policy.trainers.is_empty());
        assert_eq!(policy.booking.missed_sweep, MissedSweepPolicy::Forfeit);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/gymd-test.sock"
            data_dir = "/tmp/gymd-data"

            [booking]
            lock_timeout_ms = 500
            missed_sweep = "refund"
            allow_past_dates = true

            [sweeps]
            missed_interval_seconds = 600
            run_on_startup = false

            [[trainers]]
            id = "t-ana"
            name = "Ana Souza"
            email = "ana@example.com"

            [[trainers]]
            id = "t-ben"
            name = "Ben Ito"
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.trainers.len(), 2);
        assert_eq!(policy.booking.missed_sweep, MissedSweepPolicy::Refund);
        assert_eq!(policy.booking.lock_timeout.as_millis(), 500);
        assert!(policy.booking.allow_past_dates);
        assert_eq!(policy.sweeps.missed_interval.as_secs(), 600);
        assert_eq!(policy.sweeps.expiry_interval.as_secs(), 86_400);
        assert!(!policy.sweeps.run_on_startup);
        assert!(policy.get_trainer(&"t-ana".into()).is_some());
        assert!(policy.get_trainer(&"t-ben".into()).unwrap().email.is_none());
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reports_every_validation_error() {
        let config = r#"
            config_version = 1

            [booking]
            lock_timeout_ms = 0
            missed_sweep = "sometimes"

            [[trainers]]
            id = "t-1"
            name = "One"

            [[trainers]]
            id = "t-1"
            name = "Again"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1\n[notifications]\nenabled = false").unwrap();

        let policy = load_config(file.path()).unwrap();
        assert!(!policy.notifications.enabled);
    }
}
