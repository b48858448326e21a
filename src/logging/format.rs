//! Access-log format selection

use std::fmt;
use std::str::FromStr;

use colored::Colorize;

use crate::config::{Environment, LogConfig};

/// Formats accepted for HTTP access logging
pub const VALID_FORMATS: &[&str] = &["combined", "common", "dev", "short", "tiny"];

/// Access-log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Apache combined: common plus referrer and user agent
    #[default]
    Combined,
    /// Apache common log format
    Common,
    /// Concise, status-coloured output for development
    Dev,
    Short,
    Tiny,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Combined => "combined",
            LogFormat::Common => "common",
            LogFormat::Dev => "dev",
            LogFormat::Short => "short",
            LogFormat::Tiny => "tiny",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "combined" => Ok(LogFormat::Combined),
            "common" => Ok(LogFormat::Common),
            "dev" => Ok(LogFormat::Dev),
            "short" => Ok(LogFormat::Short),
            "tiny" => Ok(LogFormat::Tiny),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Resolve the configured access-log format
///
/// A missing value means combined. Anything outside [`VALID_FORMATS`] also falls back
/// to combined, with a console warning outside of the test environment.
pub fn log_format(config: &LogConfig, env: Environment) -> LogFormat {
    let raw = match &config.format {
        None => return LogFormat::default(),
        Some(toml::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    match raw.parse() {
        Ok(format) => format,
        Err(_) => {
            let format = LogFormat::default();
            if !env.is_test() {
                println!();
                println!(
                    "{}",
                    format!(
                        "Warning: An invalid format was provided. The logger will use the default format of \"{}\"",
                        format
                    )
                    .yellow()
                );
                println!();
            }
            format
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(format: Option<toml::Value>) -> LogConfig {
        LogConfig {
            format,
            file_logger: None,
        }
    }

    #[test]
    fn test_every_whitelisted_format_parses() {
        for name in VALID_FORMATS {
            let format: LogFormat = name.parse().unwrap();
            assert_eq!(format.as_str(), *name);
        }
    }

    #[test]
    fn test_missing_format_defaults_to_combined() {
        let format = log_format(&config_with(None), Environment::Test);
        assert_eq!(format, LogFormat::Combined);
    }

    #[test]
    fn test_valid_format_is_used() {
        let config = config_with(Some(toml::Value::String("tiny".to_string())));
        assert_eq!(log_format(&config, Environment::Test), LogFormat::Tiny);
    }

    #[test]
    fn test_invalid_format_falls_back() {
        let config = config_with(Some(toml::Value::String("verbose".to_string())));
        assert_eq!(log_format(&config, Environment::Test), LogFormat::Combined);
    }

    #[test]
    fn test_format_is_case_sensitive() {
        let config = config_with(Some(toml::Value::String("DEV".to_string())));
        assert_eq!(log_format(&config, Environment::Test), LogFormat::Combined);
    }

    #[test]
    fn test_non_string_format_falls_back() {
        let config = config_with(Some(toml::Value::Integer(7)));
        assert_eq!(log_format(&config, Environment::Test), LogFormat::Combined);
    }
}
