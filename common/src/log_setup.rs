use std::path::Path;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to create log directory '{path}': {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("Logger initialization failed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `base_level`. Console output goes to
/// stdout, with WARN and above duplicated to stderr. When `log_dir` is set,
/// a daily-rotated plain-text log is written there as well.
pub fn setup_logging(
    base_level: &str,
    log_dir: Option<&Path>,
    file_prefix: &str,
) -> Result<(), LogSetupError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(base_level).map_err(|source| LogSetupError::InvalidFilter {
            filter: base_level.to_string(),
            source,
        })?,
    };

    let console_writer = std::io::stdout.and(std::io::stderr.with_min_level(Level::WARN));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(console_writer);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LogSetupError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;

            let file_appender = tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(file_prefix)
                .filename_suffix("log")
                .max_log_files(5)
                .build(dir)?;

            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
                .with_writer(file_writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    // try_init succeeds once per process, so the slot is still empty
    if let Some(guard) = guard {
        let _ = LOG_GUARD.set(guard);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_setup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        setup_logging("info", Some(dir.path()), "first").unwrap();

        let err = setup_logging("info", Some(dir.path()), "second").unwrap_err();
        assert!(matches!(err, LogSetupError::Init(_)), "{err}");
        assert!(LOG_GUARD.get().is_some());
    }

    #[test]
    fn test_invalid_filter_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = setup_logging("autopick=loud", None, "bad").unwrap_err();
        assert!(matches!(err, LogSetupError::InvalidFilter { .. }), "{err}");
    }
}
