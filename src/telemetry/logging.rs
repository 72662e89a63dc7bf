//! Logging configuration and initialization.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the
//! `[logging]` section of the config, otherwise `info`.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration from the `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// error, warn, info, debug or trace
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Installs the global subscriber. Calling it twice is harmless: the second
/// installation is ignored.
pub fn init_logging(config: Option<&LogConfig>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(cfg) = config {
        EnvFilter::new(parse_level(&cfg.level).as_str())
    } else {
        EnvFilter::new("info")
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.map(|c| c.format).unwrap_or_default() {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            ),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().compact()),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer()),
        ),
    };
    let _ = result;
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_log_config_from_toml() {
        let cfg: LogConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(LogConfig::default().format, LogFormat::Pretty);
    }
}
