//! File logging for addonkeeper.
//!
//! Each run appends to its own timestamped file under ~/.addonkeeper/logs/.
//! The `[log]` section of the config picks the level; `ADDONKEEPER_LOG`
//! takes `EnvFilter` directives and wins over it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogSection;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "ADDONKEEPER_LOG";

/// Returns the log directory path (~/.addonkeeper/logs/).
#[must_use]
pub fn log_directory() -> PathBuf {
    crate::config::data_directory().join("logs")
}

/// Level named by the config; unknown names mean `info`.
#[must_use]
pub fn level_filter(section: &LogSection) -> LevelFilter {
    if !section.enabled {
        return LevelFilter::OFF;
    }
    match section.level.trim().to_lowercase().as_str() {
        "warning" => LevelFilter::WARN,
        "none" | "disabled" => LevelFilter::OFF,
        level => level.parse().unwrap_or(LevelFilter::INFO),
    }
}

/// Deletes `.log` files in `dir` last written more than `retention_hours`
/// before `now`. Returns the number deleted.
pub fn cleanup_old_logs(dir: &Path, retention_hours: u32, now: SystemTime) -> io::Result<u32> {
    if !dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let mut deleted = 0;

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Installs the global file subscriber.
///
/// Returns the log file in use, or `None` when logging is off.
pub fn init(section: &LogSection) -> io::Result<Option<PathBuf>> {
    init_in(section, &log_directory())
}

fn init_in(section: &LogSection, dir: &Path) -> io::Result<Option<PathBuf>> {
    let level = level_filter(section);
    if level == LevelFilter::OFF && std::env::var_os(LOG_ENV).is_none() {
        return Ok(None);
    }

    fs::create_dir_all(dir)?;
    let deleted = cleanup_old_logs(dir, section.retention_hours, SystemTime::now())?;

    let log_path = dir.join(log_file_name(chrono::Local::now()));
    let file = File::create(&log_path)?;

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::info!("[LOG] addonkeeper {} logging to {}", env!("CARGO_PKG_VERSION"), log_path.display());
    if deleted > 0 {
        tracing::info!("[LOG] Removed {} log files older than {}h", deleted, section.retention_hours);
    }

    Ok(Some(log_path))
}

fn log_file_name(at: chrono::DateTime<chrono::Local>) -> String {
    format!("addonkeeper_{}.log", at.format("%Y-%m-%d_%H-%M-%S"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn section(level: &str) -> LogSection {
        LogSection {
            level: level.to_string(),
            ..LogSection::default()
        }
    }

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(&section("DEBUG")), LevelFilter::DEBUG);
        assert_eq!(level_filter(&section("warning")), LevelFilter::WARN);
        assert_eq!(level_filter(&section("loud")), LevelFilter::INFO);
        assert_eq!(level_filter(&section("off")), LevelFilter::OFF);

        let disabled = LogSection {
            enabled: false,
            ..section("trace")
        };
        assert_eq!(level_filter(&disabled), LevelFilter::OFF);
    }

    #[test]
    fn test_cleanup_keeps_recent_and_foreign_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("addonkeeper_old.log"), "x").unwrap();
        fs::write(tmp.path().join("registry.toml"), "x").unwrap();

        let now = SystemTime::now();
        assert_eq!(cleanup_old_logs(tmp.path(), 24, now).unwrap(), 0);

        let later = now + Duration::from_secs(25 * 3600);
        assert_eq!(cleanup_old_logs(tmp.path(), 24, later).unwrap(), 1);
        assert!(!tmp.path().join("addonkeeper_old.log").exists());
        assert!(tmp.path().join("registry.toml").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("logs");
        assert_eq!(cleanup_old_logs(&missing, 24, SystemTime::now()).unwrap(), 0);
    }

    #[test]
    fn test_disabled_logging_creates_nothing() {
        if std::env::var_os(LOG_ENV).is_some() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let disabled = LogSection {
            enabled: false,
            ..LogSection::default()
        };

        assert_eq!(init_in(&disabled, &dir).unwrap(), None);
        assert!(!dir.exists());
    }

    #[test]
    fn test_log_file_name() {
        let name = log_file_name(chrono::Local::now());
        assert!(name.starts_with("addonkeeper_"));
        assert!(name.ends_with(".log"));
    }
}
