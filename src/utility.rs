//! General utility functions.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Float comparison tolerance used for quantity and margin arithmetic.
pub const EPSILON: f64 = 1e-9;

/// Engine home directory resolution.
///
/// If an `.margin_engine` folder exists in the current working directory it
/// is used, otherwise one is created under the user's home directory.
fn get_engine_dir(temp_name: &str) -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let temp_path = cwd.join(temp_name);

    if temp_path.exists() {
        return temp_path;
    }

    let home_path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let temp_path = home_path.join(temp_name);

    if !temp_path.exists() {
        let _ = fs::create_dir_all(&temp_path);
    }

    temp_path
}

/// Temp directory for config and log files
pub static TEMP_DIR: LazyLock<PathBuf> = LazyLock::new(|| get_engine_dir(".margin_engine"));

/// Get path for temp file with filename
pub fn get_file_path(filename: &str) -> PathBuf {
    TEMP_DIR.join(filename)
}

/// Get path for temp folder with folder name
pub fn get_folder_path(folder_name: &str) -> PathBuf {
    let folder_path = TEMP_DIR.join(folder_name);
    if !folder_path.exists() {
        let _ = fs::create_dir_all(&folder_path);
    }
    folder_path
}

/// Load data from JSON file in temp path
pub fn load_json(filename: &str) -> HashMap<String, serde_json::Value> {
    let filepath = get_file_path(filename);

    if filepath.exists() {
        if let Ok(content) = fs::read_to_string(&filepath) {
            if let Ok(data) = serde_json::from_str(&content) {
                return data;
            }
        }
    }

    save_json(filename, &HashMap::new());
    HashMap::new()
}

/// Save data into JSON file in temp path
pub fn save_json(filename: &str, data: &HashMap<String, serde_json::Value>) {
    let filepath = get_file_path(filename);
    if let Ok(json) = serde_json::to_string_pretty(data) {
        let _ = fs::write(filepath, json);
    }
}

/// Round price to the nearest multiple of target
pub fn round_to(value: f64, target: f64) -> f64 {
    let decimal_value = Decimal::from_f64(value).unwrap_or_default();
    let decimal_target = Decimal::from_f64(target).unwrap_or(Decimal::ONE);

    if decimal_target.is_zero() {
        return value;
    }

    let result = (decimal_value / decimal_target).round() * decimal_target;
    result.to_f64().unwrap_or(value)
}

/// Floor to the nearest multiple of target
pub fn floor_to(value: f64, target: f64) -> f64 {
    let decimal_value = Decimal::from_f64(value).unwrap_or_default();
    let decimal_target = Decimal::from_f64(target).unwrap_or(Decimal::ONE);

    if decimal_target.is_zero() {
        return value;
    }

    let result = (decimal_value / decimal_target).floor() * decimal_target;
    result.to_f64().unwrap_or(value)
}
