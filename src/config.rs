//! Minimal runtime configuration.
//! The daemon has no CLI flags or environment knobs; everything is fixed here.

use std::path::PathBuf;
use std::time::Duration;

/// Thermostat name used as the key of the stored session.
pub const DEFAULT_DEVICE_NAME: &str = "Home";
pub const DEFAULT_STORE_PATH: &str = "ecobee_db.sqlite3";
pub const DEFAULT_LOG_FILE: &str = "ecobee_antifreeze.log";
pub const DEFAULT_API_BASE_URL: &str = "https://api.ecobee.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Write access is needed to change the HVAC mode.
pub const DEFAULT_SCOPE: &str = "smartWrite";

#[derive(Debug, Clone)]
pub struct Config {
    pub device_name: String,
    /// SQLite file holding the session record.
    pub store_path: PathBuf,
    /// Log lines are appended here in addition to the console.
    pub log_file: PathBuf,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub scope: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }
}
