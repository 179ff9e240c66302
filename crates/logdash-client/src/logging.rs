//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr so they never mix with report or tail output.

use logdash_core::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" | "text" | "" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Directives from `RUST_LOG` when set, otherwise the configured level.
pub fn build_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter, String> {
    let directives = match rust_log {
        Some(value) if !value.trim().is_empty() => value,
        _ => level,
    };
    EnvFilter::try_new(directives).map_err(|e| format!("invalid log filter {directives:?}: {e}"))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), String> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(&config.level, rust_log.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match LogFormat::parse(&config.format)? {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Console => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
    };
    installed.map_err(|e| e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn format_parsing() {
        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse(" Console ").unwrap(), LogFormat::Console);
        assert!(LogFormat::parse("xml").is_err());
    }

    #[test]
    fn configured_level_applies_without_rust_log() {
        let filter = build_filter("debug", None).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        let filter = build_filter("debug", Some("warn")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
        let filter = build_filter("error", Some("  ")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }
}
