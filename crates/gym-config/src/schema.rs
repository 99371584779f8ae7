//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service paths
    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub booking: RawBookingConfig,

    #[serde(default)]
    pub sweeps: RawSweepConfig,

    #[serde(default)]
    pub notifications: RawNotificationConfig,

    /// Trainer registry. Empty means any trainer id is accepted.
    #[serde(default)]
    pub trainers: Vec<RawTrainer>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/gymd/gymd.sock)
    pub socket_path: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,

    /// Data directory for the database
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBookingConfig {
    /// Upper bound on waiting for a write transaction
    pub lock_timeout_ms: Option<u64>,

    /// "forfeit" or "refund"
    pub missed_sweep: Option<String>,

    /// Accept bookings for dates before today
    pub allow_past_dates: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSweepConfig {
    pub missed_interval_seconds: Option<u64>,
    pub expiry_interval_seconds: Option<u64>,
    pub run_on_startup: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNotificationConfig {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTrainer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}
