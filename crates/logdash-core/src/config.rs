//! Configuration for the logdash client.
//!
//! Defaults, optional YAML file, then `LOGDASH_*` environment overrides,
//! in that order of precedence. `validate` checks the merged result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default scrolling buffer bound.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Default tail poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest tail poll interval accepted.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default spacing between enrichment lookups.
pub const DEFAULT_REQUEST_SPACING: Duration = Duration::from_millis(600);

// ---------------------------------------------------------------------------
// Root config
// ---------------------------------------------------------------------------

/// Root configuration for the logdash client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub backend: BackendConfig,
    pub geolocation: GeolocationConfig,
    pub tail: TailConfig,
    pub enrichment: EnrichmentConfig,
    pub analysis: AnalysisDefaults,
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the entire configuration, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        validate_url("backend.base_url", &self.backend.base_url)?;
        if self.backend.request_timeout.is_zero() {
            return Err("backend.request_timeout_ms must be greater than 0".into());
        }

        if self.geolocation.enabled {
            validate_url("geolocation.base_url", &self.geolocation.base_url)?;
            if self.geolocation.request_timeout.is_zero() {
                return Err("geolocation.request_timeout_ms must be greater than 0".into());
            }
        }

        if self.tail.poll_interval < MIN_POLL_INTERVAL {
            return Err("tail.poll_interval_ms must be at least 100ms".into());
        }
        if self.tail.buffer_capacity < 1 {
            return Err("tail.buffer_capacity must be at least 1".into());
        }

        match self.logging.level.to_lowercase().trim() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err("logging.level must be one of trace, debug, info, warn, error".into())
            }
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => return Err("logging.format must be one of console, json".into()),
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Section configs
// ---------------------------------------------------------------------------

/// Dashboard backend (analysis, tail, history, reverse lookup, browse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8989".into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Third-party geolocation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeolocationConfig {
    pub base_url: String,
    pub enabled: bool,
    pub request_timeout: Duration,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ipapi.co".into(),
            enabled: true,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Live tail settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    pub poll_interval: Duration,
    pub buffer_capacity: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Enrichment queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    pub request_spacing: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            request_spacing: DEFAULT_REQUEST_SPACING,
        }
    }
}

/// Initial analysis filter values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisDefaults {
    pub filter_bots: bool,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "console".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    backend: PartialBackendConfig,
    #[serde(default)]
    geolocation: PartialGeolocationConfig,
    #[serde(default)]
    tail: PartialTailConfig,
    #[serde(default)]
    enrichment: PartialEnrichmentConfig,
    #[serde(default)]
    analysis: PartialAnalysisDefaults,
    #[serde(default)]
    logging: PartialLoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialBackendConfig {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    request_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialGeolocationConfig {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    request_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialTailConfig {
    #[serde(default)]
    poll_interval_ms: u64,
    #[serde(default)]
    buffer_capacity: usize,
}

#[derive(Debug, Default, Deserialize)]
struct PartialEnrichmentConfig {
    #[serde(default)]
    request_spacing_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialAnalysisDefaults {
    #[serde(default)]
    filter_bots: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
}

/// Load config: defaults < config file < environment.
///
/// An explicit path that cannot be read is a hard error; a missing file at
/// the default location is not. Returns the config and the file it was read
/// from, if any.
pub fn load_config(config_file: Option<&str>) -> Result<(Config, Option<PathBuf>), String> {
    load_config_with_env(config_file, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with_env<F>(
    config_file: Option<&str>,
    env: F,
) -> Result<(Config, Option<PathBuf>), String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = Config::default();

    let explicit = config_file
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let (path_to_try, used) = match explicit {
        Some(path) => (Some(path), true),
        None => (default_config_path(&env), false),
    };

    let mut loaded_from = None;
    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let parsed: PartialConfig = if text.trim().is_empty() {
                    PartialConfig::default()
                } else {
                    serde_yaml::from_str(&text).map_err(|err| format!("parse config: {err}"))?
                };
                apply_partial(&mut cfg, parsed);
                loaded_from = Some(path);
            }
            Err(err) => {
                if used {
                    return Err(format!(
                        "failed to load config file {}: {err}",
                        path.display()
                    ));
                }
            }
        }
    }

    apply_env(&mut cfg, &env)?;
    Ok((cfg, loaded_from))
}

fn default_config_path<F>(env: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(xdg) = env("XDG_CONFIG_HOME").filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(xdg).join("logdash").join("config.yaml"));
    }
    if let Some(home) = env("HOME").filter(|v| !v.trim().is_empty()) {
        return Some(
            Path::new(&home)
                .join(".config")
                .join("logdash")
                .join("config.yaml"),
        );
    }
    None
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) {
    if !partial.backend.base_url.trim().is_empty() {
        cfg.backend.base_url = trim_url(&partial.backend.base_url);
    }
    if partial.backend.request_timeout_ms > 0 {
        cfg.backend.request_timeout = Duration::from_millis(partial.backend.request_timeout_ms);
    }

    if !partial.geolocation.base_url.trim().is_empty() {
        cfg.geolocation.base_url = trim_url(&partial.geolocation.base_url);
    }
    if let Some(enabled) = partial.geolocation.enabled {
        cfg.geolocation.enabled = enabled;
    }
    if partial.geolocation.request_timeout_ms > 0 {
        cfg.geolocation.request_timeout =
            Duration::from_millis(partial.geolocation.request_timeout_ms);
    }

    if partial.tail.poll_interval_ms > 0 {
        cfg.tail.poll_interval = Duration::from_millis(partial.tail.poll_interval_ms);
    }
    if partial.tail.buffer_capacity > 0 {
        cfg.tail.buffer_capacity = partial.tail.buffer_capacity;
    }

    // Zero spacing is a legitimate choice for a local lookup service.
    if let Some(ms) = partial.enrichment.request_spacing_ms {
        cfg.enrichment.request_spacing = Duration::from_millis(ms);
    }

    if let Some(filter_bots) = partial.analysis.filter_bots {
        cfg.analysis.filter_bots = filter_bots;
    }

    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = partial.logging.format.trim().to_string();
    }
}

fn apply_env<F>(cfg: &mut Config, env: &F) -> Result<(), String>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(url) = get("LOGDASH_BACKEND_URL") {
        cfg.backend.base_url = trim_url(&url);
    }
    if let Some(url) = get("LOGDASH_GEO_URL") {
        cfg.geolocation.base_url = trim_url(&url);
    }
    if let Some(value) = get("LOGDASH_GEO_ENABLED") {
        cfg.geolocation.enabled = parse_bool("LOGDASH_GEO_ENABLED", &value)?;
    }
    if let Some(value) = get("LOGDASH_POLL_INTERVAL_MS") {
        cfg.tail.poll_interval = Duration::from_millis(parse_u64("LOGDASH_POLL_INTERVAL_MS", &value)?);
    }
    if let Some(value) = get("LOGDASH_LOG_LEVEL") {
        cfg.logging.level = value;
    }
    if let Some(value) = get("LOGDASH_LOG_FORMAT") {
        cfg.logging.format = value;
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{key} must be a boolean, got {value:?}")),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("{key} must be a non-negative integer, got {value:?}"))
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn validate_url(field: &str, url: &str) -> Result<(), String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(format!("{field} is required"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("{field} must start with http:// or https://"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
