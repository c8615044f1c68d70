//! Logging system configuration and initialization
//!
//! Console output goes to stderr so that report output on stdout stays
//! machine readable. Optional extras:
//! - Structured JSON lines
//! - A log file written through a non-blocking appender
//! - `RUST_LOG` overrides the configured level entirely

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{Subscriber, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        self,
        format::{DefaultFields, Format, Full},
        time::ChronoUtc,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingSettings;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Dependency targets that are only interesting when tracing
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("sqlx::query", "warn"),
    ("sqlx::sqlite", "warn"),
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("headless_chrome", "warn"),
    ("tungstenite", "warn"),
];

/// Build the filter for a configured level.
///
/// Below `trace`, the verbose dependency targets above are capped while
/// this crate keeps the requested level.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {level}"))?;
    if !level.to_lowercase().contains("trace") {
        for (target, target_level) in NOISY_TARGETS {
            filter = filter.add_directive(format!("{target}={target_level}").parse()?);
        }
        filter = filter.add_directive(format!("collectr_reconciler={level}").parse()?);
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// as long as the process logs.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(&settings.level)?,
    };
    let registry = Registry::default().with(env_filter);

    let mut guard = None;
    match (&settings.file, settings.json) {
        (Some(path), json) => {
            let (directory, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
            let (file_writer, file_guard) = non_blocking(rolling::never(directory, file_name));
            guard = Some(file_guard);

            if json {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                    .with_target(true)
                    .with_ansi(false);
                registry.with(file_layer).with(console_layer()).try_init()?;
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                    .with_target(false)
                    .with_ansi(false);
                registry.with(file_layer).with(console_layer()).try_init()?;
            }
        }
        (None, true) => {
            let json_layer = fmt::Layer::new()
                .json()
                .with_writer(std::io::stderr)
                .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                .with_target(true);
            registry.with(json_layer).try_init()?;
        }
        (None, false) => {
            registry.with(console_layer()).try_init()?;
        }
    }

    info!(level = %settings.level, json = settings.json, file = ?settings.file, "Logging initialized");
    Ok(guard)
}

fn console_layer<S>() -> fmt::Layer<S, DefaultFields, Format<Full, ChronoUtc>, fn() -> std::io::Stderr>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::Layer::new()
        .with_writer(std::io::stderr as fn() -> std::io::Stderr)
        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
        .with_target(false)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Log file path has no file name: {}", path.display()))?;
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok((directory, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_filter_suppresses_dependencies_below_trace() {
        let filter = build_env_filter("debug").unwrap().to_string();
        assert!(filter.contains("sqlx::query=warn"));
        assert!(filter.contains("headless_chrome=warn"));
        assert!(filter.contains("collectr_reconciler=debug"));
    }

    #[test]
    fn test_trace_level_keeps_everything() {
        let filter = build_env_filter("trace").unwrap().to_string();
        assert!(!filter.contains("sqlx::query"));
    }

    #[test]
    fn test_split_log_path() {
        let path = PathBuf::from("logs/import.log");
        let (dir, name) = split_log_path(&path).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "import.log");

        let bare = PathBuf::from("import.log");
        assert_eq!(split_log_path(&bare).unwrap().0, Path::new("."));
    }
}
