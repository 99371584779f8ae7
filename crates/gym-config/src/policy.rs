//! Validated policy structures

use crate::schema::{
    RawBookingConfig, RawConfig, RawNotificationConfig, RawServiceConfig, RawSweepConfig,
    RawTrainer,
};
use gym_util::{TrainerId, default_data_dir, default_log_dir, socket_path_without_env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_MISSED_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(86_400);

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone, Default)]
pub struct FacilityPolicy {
    pub service: ServiceConfig,
    pub booking: BookingPolicy,
    pub sweeps: SweepSchedule,
    pub notifications: NotificationPolicy,
    pub trainers: Vec<Trainer>,
}

impl FacilityPolicy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            booking: BookingPolicy::from_raw(raw.booking),
            sweeps: SweepSchedule::from_raw(raw.sweeps),
            notifications: NotificationPolicy::from_raw(raw.notifications),
            trainers: raw.trainers.into_iter().map(Trainer::from_raw).collect(),
        }
    }

    pub fn get_trainer(&self, id: &TrainerId) -> Option<&Trainer> {
        self.trainers.iter().find(|t| &t.id == id)
    }

    /// With an empty registry every trainer id is accepted.
    pub fn is_known_trainer(&self, id: &TrainerId) -> bool {
        self.trainers.is_empty() || self.get_trainer(id).is_some()
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            socket_path: raw.socket_path.unwrap_or(defaults.socket_path),
            log_dir: raw.log_dir.unwrap_or(defaults.log_dir),
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: socket_path_without_env(),
            log_dir: default_log_dir(),
            data_dir: default_data_dir(),
        }
    }
}

/// What the missed-session sweep does with the debited credit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedSweepPolicy {
    /// The credit stays consumed
    #[default]
    Forfeit,
    /// Same as staff marking the session missed
    Refund,
}

impl MissedSweepPolicy {
    pub fn refunds(&self) -> bool {
        matches!(self, MissedSweepPolicy::Refund)
    }
}

impl FromStr for MissedSweepPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forfeit" => Ok(MissedSweepPolicy::Forfeit),
            "refund" => Ok(MissedSweepPolicy::Refund),
            other => Err(format!(
                "'{}' is not a missed-sweep policy (expected \"forfeit\" or \"refund\")",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub lock_timeout: Duration,
    pub missed_sweep: MissedSweepPolicy,
    pub allow_past_dates: bool,
}

impl BookingPolicy {
    fn from_raw(raw: RawBookingConfig) -> Self {
        Self {
            lock_timeout: raw
                .lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LOCK_TIMEOUT),
            missed_sweep: raw
                .missed_sweep
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            allow_past_dates: raw.allow_past_dates.unwrap_or(false),
        }
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            missed_sweep: MissedSweepPolicy::Forfeit,
            allow_past_dates: false,
        }
    }
}

/// How often the service triggers each sweep
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    pub missed_interval: Duration,
    pub expiry_interval: Duration,
    pub run_on_startup: bool,
}

impl SweepSchedule {
    fn from_raw(raw: RawSweepConfig) -> Self {
        Self {
            missed_interval: raw
                .missed_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_MISSED_SWEEP_INTERVAL),
            expiry_interval: raw
                .expiry_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_EXPIRY_SWEEP_INTERVAL),
            run_on_startup: raw.run_on_startup.unwrap_or(true),
        }
    }
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            missed_interval: DEFAULT_MISSED_SWEEP_INTERVAL,
            expiry_interval: DEFAULT_EXPIRY_SWEEP_INTERVAL,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    pub enabled: bool,
}

impl NotificationPolicy {
    fn from_raw(raw: RawNotificationConfig) -> Self {
        Self {
            enabled: raw.enabled.unwrap_or(true),
        }
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Registered trainer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trainer {
    pub id: TrainerId,
    pub name: String,
    pub email: Option<String>,
}

impl Trainer {
    fn from_raw(raw: RawTrainer) -> Self {
        Self {
            id: TrainerId::new(raw.id.trim()),
            name: raw.name,
            email: raw.email,
        }
    }
}
