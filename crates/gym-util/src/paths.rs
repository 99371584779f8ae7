//! Default paths for gymd components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/gymd/gymd.sock` or `/tmp/gymd-$USER/gymd.sock`
//! - Data: `$XDG_DATA_HOME/gymd` or `~/.local/share/gymd`
//! - Config: `$XDG_CONFIG_HOME/gymd/config.toml` or `~/.config/gymd/config.toml`
//! - Logs: `$XDG_STATE_HOME/gymd` or `~/.local/state/gymd`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const GYM_SOCKET_ENV: &str = "GYM_SOCKET";

/// Environment variable for overriding the data directory
pub const GYM_DATA_DIR_ENV: &str = "GYM_DATA_DIR";

const SOCKET_FILENAME: &str = "gymd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const DATABASE_FILENAME: &str = "gymd.db";
const APP_DIR: &str = "gymd";

/// Resolve `$XDG_<name>` or fall back to `~/<home_relative>`, then `/tmp`.
fn xdg_dir(xdg_var: &str, home_relative: &[&str], last_resort: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(xdg_var) {
        return PathBuf::from(dir).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        let mut path = PathBuf::from(home);
        for part in home_relative {
            path.push(part);
        }
        return path.join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(last_resort)
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$GYM_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/gymd/gymd.sock`
/// 3. `/tmp/gymd-$USER/gymd.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(GYM_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking `GYM_SOCKET`.
/// Used for config defaults where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory (`$GYM_DATA_DIR` wins).
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(GYM_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking `GYM_DATA_DIR`.
pub fn data_dir_without_env() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"], "data")
}

/// Database file inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILENAME)
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", &[".config"], "config").join(CONFIG_FILENAME)
}

/// Get the default log directory.
pub fn default_log_dir() -> PathBuf {
    xdg_dir("XDG_STATE_HOME", &[".local", "state"], "logs")
}
