// Rust guideline compliant 2026-10-18

//! Tracing subscriber: console output plus two JSON log files.
//!
//! The combined file receives every event that passes the level filter. The
//! fraud file receives warnings and errors only, which includes every
//! `fraud.detected` alert.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _, fmt};

use crate::settings::{LogFormat, Settings};

/// Open `path` for appending, creating missing parent directories.
/// An empty path means the file is disabled.
fn open_append(path: &str) -> anyhow::Result<Option<Arc<File>>> {
    if path.trim().is_empty() {
        return Ok(None);
    }
    let path = Path::new(path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok(Some(Arc::new(file)))
}

/// Build the subscriber without installing it.
///
/// # Errors
///
/// Fails when a log file or its directory cannot be created.
pub fn subscriber(
    filter: EnvFilter,
    format: LogFormat,
    log_file: &str,
    fraud_log_file: &str,
) -> anyhow::Result<Box<dyn Subscriber + Send + Sync>> {
    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };
    let combined = open_append(log_file)?
        .map(|file| fmt::layer().json().with_ansi(false).with_writer(file));
    let fraud = open_append(fraud_log_file)?.map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(file)
            .with_filter(LevelFilter::WARN)
    });

    Ok(Box::new(
        tracing_subscriber::registry()
            .with(filter)
            .with(text)
            .with(json)
            .with(combined)
            .with(fraud),
    ))
}

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
///
/// # Errors
///
/// Fails when a log file cannot be opened or a subscriber is already set.
pub fn init(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    subscriber(filter, settings.log_format, &settings.log_file, &settings.fraud_log_file)?
        .try_init()
        .context("installing tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::{open_append, subscriber};
    use crate::settings::LogFormat;
    use std::fs;
    use std::path::PathBuf;
    use tracing_subscriber::EnvFilter;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fraud-logs-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    // TEL-T01: info reaches the combined file only; warn reaches both.
    #[test]
    fn files_split_by_level() {
        let dir = scratch_dir("split");
        let combined = dir.join("nested").join("combined.log");
        let fraud = dir.join("fraud.log");

        let sub = subscriber(
            EnvFilter::new("info"),
            LogFormat::Json,
            combined.to_str().unwrap(),
            fraud.to_str().unwrap(),
        )
        .unwrap();
        tracing::subscriber::with_default(sub, || {
            tracing::info!(transaction_id = "txn_clean", "pipeline.clean");
            tracing::warn!(
                transaction_id = "txn_9",
                user_id = "user_1",
                rule = "roundAmount",
                "fraud.detected"
            );
            tracing::debug!("filtered.out");
        });

        let all = fs::read_to_string(&combined).unwrap();
        assert!(all.contains("txn_clean"));
        assert!(all.contains("fraud.detected"));
        assert!(!all.contains("filtered.out"));

        let alerts = fs::read_to_string(&fraud).unwrap();
        assert_eq!(alerts.lines().count(), 1);
        let line: serde_json::Value = serde_json::from_str(alerts.trim()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["transaction_id"], "txn_9");
        assert_eq!(line["fields"]["rule"], "roundAmount");
        assert!(line["timestamp"].is_string());

        fs::remove_dir_all(&dir).unwrap();
    }

    // TEL-T02: files are appended to across restarts.
    #[test]
    fn files_are_appended() {
        let dir = scratch_dir("append");
        let fraud = dir.join("fraud.log");
        for _ in 0..2 {
            let sub =
                subscriber(EnvFilter::new("info"), LogFormat::Text, "", fraud.to_str().unwrap())
                    .unwrap();
            tracing::subscriber::with_default(sub, || tracing::error!("sink.persist.failed"));
        }
        assert_eq!(fs::read_to_string(&fraud).unwrap().lines().count(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    // TEL-T03: an empty path disables the file.
    #[test]
    fn empty_path_disables_file() {
        assert!(open_append("").unwrap().is_none());
        assert!(open_append("  ").unwrap().is_none());
    }
}
