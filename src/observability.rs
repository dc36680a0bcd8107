//! This module provides observability and diagnostics for the pipeline manager.
//!
//! It owns the process-wide `log` backend (an `env_logger` instance installed at
//! most once) and the `log_metric!` macro used to emit structured key-value
//! lines for lifecycle events. The `Diagnostics` type is the stage that always
//! sits at index 0 of a pipeline: it is configured and built like any other
//! component, but it is never spawned. The orchestrator flushes it around every
//! lifecycle call.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Once;

use log::LevelFilter;

use crate::config::LoggingSettings;

/// Logs a structured key-value metric line at debug level.
///
/// # Example
/// ```
/// use meterline::log_metric;
/// let workers = 3;
/// log_metric!("event" = "spawned", "workers" = &workers);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        if $crate::__log::log_enabled!($crate::__log::Level::Debug) {
            // Collect each pair as a JSON string fragment
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            $crate::__log::debug!("METERLINE_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

//==================================================================================
// 1. Logger Installation
//==================================================================================

static INIT_LOGGER: Once = Once::new();

/// Installs the process-wide logger. Only the first call in a process takes
/// effect; later calls only validate that their log file can be opened.
///
/// Returns `Ok(true)` if this call installed the logger.
pub fn install_logger(
    level: LevelFilter,
    log_file: Option<&Path>,
    append: bool,
) -> io::Result<bool> {
    // Open the file up front so permission problems surface as errors even when
    // another pipeline already installed the backend.
    let target = match log_file {
        Some(path) => Some(open_log_file(path, append)?),
        None => None,
    };

    let mut installed = false;
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(level);

        // Custom formatter: wall-clock time, level, target and message
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )?;
            buf.flush()?;
            Ok(())
        });

        if let Some(file) = target {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        installed = builder.try_init().is_ok();
    });

    Ok(installed)
}

fn open_log_file(path: &Path, append: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path)
}

/// Turns on verbose logging for embedders that do not go through a pipeline's
/// `"logging"` section.
pub fn enable_verbose_logging(log_file: Option<&Path>) -> io::Result<bool> {
    install_logger(LevelFilter::Info, log_file, true)
}

//==================================================================================
// 2. The Diagnostics Stage
//==================================================================================

/// The diagnostics stage at index 0 of every pipeline.
#[derive(Debug)]
pub struct Diagnostics {
    settings: LoggingSettings,
}

impl Diagnostics {
    /// Builds the stage, installing the logger if this is the first pipeline in
    /// the process. Fails if the configured log file cannot be opened.
    pub fn new(settings: LoggingSettings) -> io::Result<Self> {
        let installed = install_logger(
            settings.level,
            settings.app_log_filename.as_deref(),
            settings.append,
        )?;
        if installed {
            log::debug!("Installed logger at level {}", settings.level);
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &LoggingSettings {
        &self.settings
    }

    /// Flushes the logger. Writes are synchronous, so once this returns every
    /// record logged before the call has reached its target.
    pub fn flush(&self) {
        log::logger().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a log file.
        let result = install_logger(LevelFilter::Info, Some(dir.path()), true);
        assert!(result.is_err());
    }

    #[test]
    fn test_diagnostics_accepts_a_writable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let settings = LoggingSettings {
            app_log_filename: Some(path.clone()),
            ..Default::default()
        };

        let diagnostics = Diagnostics::new(settings).unwrap();
        diagnostics.flush();
        assert!(path.exists());
    }

    #[test]
    fn test_log_metric_compiles_with_mixed_values() {
        let count = 2usize;
        log_metric!("event" = "test", "count" = count, "name" = "meter");
    }
}
