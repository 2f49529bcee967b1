//! Logging setup for the engine.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::setting::LogConfig;
use crate::utility::get_folder_path;

/// Convert integer log level to tracing Level
pub fn level_from_int(level: i32) -> Level {
    match level {
        0..=10 => Level::DEBUG,
        11..=20 => Level::INFO,
        21..=30 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Initialize the tracing subscriber from the log configuration.
///
/// Console and file layers are enabled independently; `RUST_LOG` still takes
/// precedence over the configured level.
pub fn init_logger(config: &LogConfig) {
    if !config.active {
        return;
    }

    let level = level_from_int(config.level);
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.console {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        if config.file {
            let file = open_log_file();
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false);

            subscriber.with(fmt_layer).with(file_layer).init();
        } else {
            subscriber.with(fmt_layer).init();
        }
    } else if config.file {
        let file = open_log_file();
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false);

        subscriber.with(file_layer).init();
    }
}

fn open_log_file() -> fs::File {
    let log_path = get_log_file_path();

    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("Failed to open log file")
}

/// Get the log file path for today
fn get_log_file_path() -> PathBuf {
    let log_folder = get_folder_path("log");
    let today = Local::now().format("%Y%m%d").to_string();
    let filename = format!("engine_{}.log", today);
    log_folder.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_int() {
        assert_eq!(level_from_int(10), Level::DEBUG);
        assert_eq!(level_from_int(20), Level::INFO);
        assert_eq!(level_from_int(30), Level::WARN);
        assert_eq!(level_from_int(40), Level::ERROR);
    }
}
