//! Structured logging setup
//!
//! Builds the tracing subscriber from [`LoggingConfig`]:
//! - pretty or JSON formatting
//! - console, daily-rolling file, or both
//! - `RUST_LOG` takes precedence over the configured level

use crate::config::LoggingConfig;
use std::path::Path;
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

const LOG_FILE_NAME: &str = "claude-analytics.log";

/// Initialize the logging system.
///
/// When file output is enabled the returned guard must be kept alive for the
/// life of the process, otherwise buffered lines are lost on exit. Calling
/// this twice is harmless: the second subscriber is discarded.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    match config.output.as_str() {
        "file" => Some(init_file_logging(env_filter, &config.format, log_dir)),
        "both" => Some(init_combined_logging(env_filter, &config.format, log_dir)),
        _ => {
            init_console_logging(env_filter, &config.format);
            None
        }
    }
}

fn init_console_logging(filter: EnvFilter, format: &str) {
    let subscriber = tracing_subscriber::registry().with(filter);

    let _ = match format {
        "json" => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        _ => subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };
}

fn init_file_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry().with(filter);

    let _ = match format {
        "json" => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init(),
    };

    guard
}

fn init_combined_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry().with(filter);

    let _ = match format {
        "json" => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(fmt::layer().json().with_writer(non_blocking))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .try_init(),
    };

    guard
}

/// Span wrapping one full scan, tagged with a fresh scan id
pub fn scan_span(root: &Path) -> Span {
    tracing::info_span!(
        "scan",
        scan_id = %Uuid::new_v4(),
        root = %root.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_console_logging_twice_is_harmless() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        };
        assert!(init_logging(&config, Path::new("logs")).is_none());
        assert!(init_logging(&config, Path::new("logs")).is_none());
    }

    #[test]
    fn test_file_logging_returns_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "INFO".to_string(),
            format: "json".to_string(),
            output: "file".to_string(),
        };
        let guard = init_logging(&config, dir.path());
        assert!(guard.is_some());
    }
}
