//! Console and file transports with tracing integration
//!
//! The console transport is always installed. The file transport is attached only
//! when the config names both a directory and a file name and the target path can
//! actually be opened for appending.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use super::rotation::RotatingFile;
use crate::config::{friendly_io_error_message, Environment, LogConfig};

/// Default max file size before rotating (10 MiB)
pub const DEFAULT_MAX_SIZE: u64 = 10_485_760;

/// Default number of files kept, the live one included
pub const DEFAULT_MAX_FILES: usize = 2;

/// Resolved options for the disk transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogOptions {
    pub level: LevelFilter,
    pub colorize: bool,
    pub path: PathBuf,
    pub timestamp: bool,
    pub max_size: u64,
    pub max_files: usize,
    pub json: bool,
    pub eol: &'static str,
    /// Newest entries always live in the configured file name
    pub tailable: bool,
}

/// Information about the active log file
#[derive(Debug, Clone)]
pub struct LogFileInfo {
    /// Full path to the live log file
    pub path: PathBuf,
    pub json: bool,
}

/// An opened file transport, ready to be layered into the subscriber
pub struct FileTransport {
    pub info: LogFileInfo,
    pub level: LevelFilter,
    writer: NonBlocking,
    guard: WorkerGuard,
}

/// Guard that keeps the logging system alive
///
/// Dropping it flushes pending file writes.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Build the file transport options from config
///
/// Returns `None` when either the directory or the file name is missing.
pub fn file_log_options(config: &LogConfig) -> Option<FileLogOptions> {
    let file_logger = config.file_logger.as_ref();
    let directory = file_logger.and_then(|f| f.directory_path.as_deref());
    let file_name = file_logger.and_then(|f| f.file_name.as_deref());

    let (Some(file_logger), Some(directory), Some(file_name)) = (file_logger, directory, file_name)
    else {
        println!("unable to find logging file configuration");
        return None;
    };

    let directory = shellexpand::full(directory)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| directory.to_string());

    Some(FileLogOptions {
        level: LevelFilter::DEBUG,
        colorize: false,
        path: PathBuf::from(directory).join(file_name),
        timestamp: true,
        // Zero means unset
        max_size: file_logger
            .maxsize
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_SIZE),
        max_files: file_logger
            .max_files
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_FILES),
        json: file_logger.json.unwrap_or(false),
        eol: "\n",
        tailable: true,
    })
}

/// Open the disk transport if it is configured and writable
///
/// Failures are reported on the console (outside of tests) and never abort startup.
pub fn setup_file_logger(config: &LogConfig, env: Environment) -> Option<FileTransport> {
    let options = file_log_options(config)?;

    match RotatingFile::open(&options.path, options.max_size, options.max_files) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            Some(FileTransport {
                info: LogFileInfo {
                    path: options.path,
                    json: options.json,
                },
                level: options.level,
                writer,
                guard,
            })
        }
        Err(e) => {
            if !env.is_test() {
                println!();
                println!(
                    "{}",
                    "An error has occured during the creation of the File transport logger."
                        .red()
                );
                println!(
                    "{}",
                    friendly_io_error_message(
                        &e,
                        &format!("Failed to open {}", options.path.display())
                    )
                    .red()
                );
                println!();
            }
            None
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn file_layer(transport: &FileTransport) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(transport.writer.clone())
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    if transport.info.json {
        layer
            .json()
            .with_filter(transport.level)
            .boxed()
    } else {
        layer.with_filter(transport.level).boxed()
    }
}

fn console_layer() -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_filter(LevelFilter::INFO)
        .boxed()
}

/// Initialize console and (optionally) file logging
///
/// Returns the active log file, if any, and a guard that must be kept alive for the
/// duration of logging.
pub fn init_logging(
    config: &LogConfig,
    env: Environment,
) -> Result<(Option<LogFileInfo>, LoggingGuard)> {
    let transport = setup_file_logger(config, env);

    let mut layers: Vec<BoxedLayer> = vec![console_layer()];
    if let Some(transport) = &transport {
        layers.push(file_layer(transport));
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portal=debug,tower_http=info".into());

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    install_panic_hook();

    let (info, guard) = match transport {
        Some(t) => (Some(t.info), LoggingGuard { _file: Some(t.guard) }),
        None => (None, LoggingGuard { _file: None }),
    };

    Ok((info, guard))
}

/// Route panics through the logger instead of only stderr
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(location = %location, "Panic: {}", panic_info);
        previous(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileLoggerConfig;
    use tempfile::TempDir;

    fn config_for(file_logger: FileLoggerConfig) -> LogConfig {
        LogConfig {
            format: None,
            file_logger: Some(file_logger),
        }
    }

    #[test]
    fn test_options_missing_section() {
        assert!(file_log_options(&LogConfig::default()).is_none());
    }

    #[test]
    fn test_options_missing_directory() {
        let config = config_for(FileLoggerConfig {
            file_name: Some("app.log".to_string()),
            ..Default::default()
        });
        assert!(file_log_options(&config).is_none());
    }

    #[test]
    fn test_options_missing_file_name() {
        let config = config_for(FileLoggerConfig {
            directory_path: Some("/tmp".to_string()),
            ..Default::default()
        });
        assert!(file_log_options(&config).is_none());
    }

    #[test]
    fn test_options_defaults() {
        let config = config_for(FileLoggerConfig {
            directory_path: Some("/var/log/portal".to_string()),
            file_name: Some("app.log".to_string()),
            ..Default::default()
        });
        let options = file_log_options(&config).unwrap();

        assert_eq!(options.path, PathBuf::from("/var/log/portal/app.log"));
        assert_eq!(options.level, LevelFilter::DEBUG);
        assert_eq!(options.max_size, 10_485_760);
        assert_eq!(options.max_files, 2);
        assert!(!options.json);
        assert!(!options.colorize);
        assert!(options.timestamp);
        assert!(options.tailable);
        assert_eq!(options.eol, "\n");
    }

    #[test]
    fn test_options_configured_values() {
        let config = config_for(FileLoggerConfig {
            directory_path: Some("/var/log".to_string()),
            file_name: Some("portal.log".to_string()),
            maxsize: Some(2048),
            max_files: Some(5),
            json: Some(true),
        });
        let options = file_log_options(&config).unwrap();

        assert_eq!(options.max_size, 2048);
        assert_eq!(options.max_files, 5);
        assert!(options.json);
    }

    #[test]
    fn test_options_zero_limits_use_defaults() {
        let config = config_for(FileLoggerConfig {
            directory_path: Some("/var/log".to_string()),
            file_name: Some("portal.log".to_string()),
            maxsize: Some(0),
            max_files: Some(0),
            json: None,
        });
        let options = file_log_options(&config).unwrap();

        assert_eq!(options.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(options.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_options_expand_home() {
        let config = config_for(FileLoggerConfig {
            directory_path: Some("~/logs".to_string()),
            file_name: Some("app.log".to_string()),
            ..Default::default()
        });
        let options = file_log_options(&config).unwrap();
        if dirs::home_dir().is_some() {
            assert!(!options.path.to_string_lossy().starts_with('~'));
        }
        assert!(options.path.ends_with("logs/app.log"));
    }

    #[test]
    fn test_setup_file_logger_writable_path() {
        let dir = TempDir::new().unwrap();
        let config = config_for(FileLoggerConfig {
            directory_path: Some(dir.path().to_string_lossy().into_owned()),
            file_name: Some("app.log".to_string()),
            ..Default::default()
        });

        let transport = setup_file_logger(&config, Environment::Test).unwrap();
        assert_eq!(transport.info.path, dir.path().join("app.log"));
        assert!(dir.path().join("app.log").exists());
    }

    #[test]
    fn test_setup_file_logger_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let config = config_for(FileLoggerConfig {
            directory_path: Some(
                dir.path()
                    .join("does-not-exist")
                    .to_string_lossy()
                    .into_owned(),
            ),
            file_name: Some("app.log".to_string()),
            ..Default::default()
        });

        assert!(setup_file_logger(&config, Environment::Test).is_none());
    }

    #[test]
    fn test_setup_file_logger_not_configured() {
        assert!(setup_file_logger(&LogConfig::default(), Environment::Test).is_none());
    }
}
