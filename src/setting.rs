//! Engine configuration.
//!
//! Unlike a global settings registry, the configuration is loaded once and
//! passed by value into the session engine; components receive exactly the
//! parameters they consume.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::utility::get_file_path;

/// Config filename inside the engine temp directory
const CONFIG_FILENAME: &str = "engine_config.json";

/// Logging configuration consumed by `logger::init_logger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub active: bool,
    /// Level number: 10 debug, 20 info, 30 warning, 40 error
    pub level: i32,
    pub console: bool,
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            active: true,
            level: 20,
            console: true,
            file: false,
        }
    }
}

/// Risk and session parameters recognized by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cap on absolute position per instrument; intents beyond it are clamped
    pub max_position_per_instrument: Option<f64>,
    /// Cap on single-order notional (price * quantity * contract size)
    pub max_order_notional: Option<f64>,
    /// Maximum submissions within the rate window
    pub max_order_rate: u32,
    /// Rate window length in seconds
    pub max_order_rate_window_secs: u64,
    /// Minimum post-trade margin headroom as a fraction of equity
    pub margin_buffer_ratio: f64,
    /// Position drift beyond this quantity triggers a Drift notice
    pub drift_tolerance: f64,
    /// Acknowledgement deadline per order, in seconds
    pub order_timeout_secs: u64,
    /// Interval of the internal timer source, in seconds
    pub timer_interval_secs: u64,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_position_per_instrument: None,
            max_order_notional: None,
            max_order_rate: 10,
            max_order_rate_window_secs: 1,
            margin_buffer_ratio: 0.0,
            drift_tolerance: 1e-6,
            order_timeout_secs: 10,
            timer_interval_secs: 1,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from the engine temp directory, falling back to defaults
    /// when the file is absent or unreadable.
    pub fn load() -> Self {
        Self::load_from(get_file_path(CONFIG_FILENAME))
    }

    /// Load config from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(config) = serde_json::from_str(&content) {
                    return config;
                }
                tracing::warn!(path = %path.display(), "invalid engine config, using defaults");
            }
        }
        Self::default()
    }

    /// Save config to the engine temp directory.
    pub fn save(&self) -> std::io::Result<()> {
        let path = get_file_path(CONFIG_FILENAME);
        let json = serde_json::to_string_pretty(self).expect("config serializes");
        fs::write(path, json)
    }

    /// Rate window as a chrono duration.
    pub fn rate_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_order_rate_window_secs as i64)
    }

    /// Order acknowledgement timeout as a chrono duration.
    pub fn order_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.order_timeout_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.max_position_per_instrument.is_none());
        assert_eq!(config.max_order_rate, 10);
        assert_eq!(config.order_timeout_secs, 10);
        assert!(config.log.active);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = EngineConfig::load_from("/nonexistent/engine_config.json");
        assert_eq!(config.timer_interval_secs, 1);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");

        let mut config = EngineConfig::default();
        config.max_position_per_instrument = Some(5.0);
        config.margin_buffer_ratio = 0.1;
        fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = EngineConfig::load_from(&path);
        assert_eq!(loaded.max_position_per_instrument, Some(5.0));
        assert_eq!(loaded.margin_buffer_ratio, 0.1);
    }
}
