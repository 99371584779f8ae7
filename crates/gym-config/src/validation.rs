//! Configuration validation

use crate::schema::{RawConfig, RawTrainer};
use std::collections::HashSet;
use thiserror::Error;

/// Accepted range for `booking.lock_timeout_ms`
pub const LOCK_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=30_000;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Trainer '{trainer_id}': {message}")]
    TrainerError { trainer_id: String, message: String },

    #[error("Duplicate trainer ID: {0}")]
    DuplicateTrainerId(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen_ids = HashSet::new();
    for trainer in &config.trainers {
        if !seen_ids.insert(&trainer.id) {
            errors.push(ValidationError::DuplicateTrainerId(trainer.id.clone()));
        }
    }

    for trainer in &config.trainers {
        errors.extend(validate_trainer(trainer));
    }

    if let Some(ms) = config.booking.lock_timeout_ms
        && !LOCK_TIMEOUT_RANGE_MS.contains(&ms)
    {
        errors.push(ValidationError::InvalidValue {
            key: "booking.lock_timeout_ms",
            message: format!(
                "{} is outside {}..={}",
                ms,
                LOCK_TIMEOUT_RANGE_MS.start(),
                LOCK_TIMEOUT_RANGE_MS.end()
            ),
        });
    }

    if let Some(policy) = &config.booking.missed_sweep
        && let Err(message) = policy.parse::<crate::MissedSweepPolicy>()
    {
        errors.push(ValidationError::InvalidValue {
            key: "booking.missed_sweep",
            message,
        });
    }

    for (key, value) in [
        (
            "sweeps.missed_interval_seconds",
            config.sweeps.missed_interval_seconds,
        ),
        (
            "sweeps.expiry_interval_seconds",
            config.sweeps.expiry_interval_seconds,
        ),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::InvalidValue {
                key,
                message: "interval must be at least 1 second".into(),
            });
        }
    }

    errors
}

fn validate_trainer(trainer: &RawTrainer) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if trainer.id.trim().is_empty() {
        errors.push(ValidationError::TrainerError {
            trainer_id: trainer.id.clone(),
            message: "id cannot be empty".into(),
        });
    }

    if trainer.name.trim().is_empty() {
        errors.push(ValidationError::TrainerError {
            trainer_id: trainer.id.clone(),
            message: "name cannot be empty".into(),
        });
    }

    if let Some(email) = &trainer.email
        && !looks_like_email(email)
    {
        errors.push(ValidationError::TrainerError {
            trainer_id: trainer.id.clone(),
            message: format!("'{}' is not an email address", email),
        });
    }

    errors
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !s.contains(' '),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawBookingConfig, RawSweepConfig};

    fn config_with(trainers: Vec<RawTrainer>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            booking: Default::default(),
            sweeps: Default::default(),
            notifications: Default::default(),
            trainers,
        }
    }

    fn trainer(id: &str, email: Option<&str>) -> RawTrainer {
        RawTrainer {
            id: id.into(),
            name: "Trainer".into(),
            email: email.map(String::from),
        }
    }

    #[test]
    fn valid_trainers_pass() {
        let config = config_with(vec![
            trainer("t-1", Some("one@gym.example")),
            trainer("t-2", None),
        ]);
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn bad_email_is_reported() {
        let config = config_with(vec![trainer("t-1", Some("not-an-email"))]);
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("t-1"));
    }

    #[test]
    fn empty_trainer_id_is_reported() {
        let config = config_with(vec![trainer("  ", None)]);
        assert!(matches!(
            validate_config(&config).as_slice(),
            [ValidationError::TrainerError { .. }]
        ));
    }

    #[test]
    fn lock_timeout_bounds() {
        let mut config = config_with(vec![]);
        config.booking = RawBookingConfig {
            lock_timeout_ms: Some(30_000),
            ..Default::default()
        };
        assert!(validate_config(&config).is_empty());

        config.booking.lock_timeout_ms = Some(30_001);
        assert_eq!(validate_config(&config).len(), 1);
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let mut config = config_with(vec![]);
        config.sweeps = RawSweepConfig {
            expiry_interval_seconds: Some(0),
            ..Default::default()
        };
        let errors = validate_config(&config);
        assert!(errors[0].to_string().contains("sweeps.expiry_interval_seconds"));
    }
}
