//! Logging configuration and initialization.
//!
//! Structured logging with level presets, per-target overrides from the CLI,
//! optional JSON output, and `RUST_LOG` taking precedence when set.

use std::collections::HashMap;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Production: startup and request-level events only
    #[default]
    Production,
    /// Verbose: per-execution operational detail
    Verbose,
    /// Debug: dispatch decisions and drain progress
    Debug,
    /// Trace: everything
    Trace,
    /// Quiet: warnings and errors only
    Quiet,
}

/// Logging configuration built from CLI arguments.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Per-target level overrides (e.g., "exec" -> DEBUG)
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            preset: LogPreset::Production,
            overrides: HashMap::new(),
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig from CLI arguments.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        // Quiet trumps everything, then the loudest remaining flag wins.
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        // Overrides come as "target=level", comma-separable; bare targets are
        // prefixed with "webterm::" automatically.
        let mut overrides = HashMap::new();
        for override_str in log_overrides {
            for part in override_str.split(',') {
                if let Some((target, level_str)) = part.split_once('=') {
                    let target = target.trim();
                    let full_target = if target.starts_with("webterm::") || target == "tower_http" {
                        target.to_string()
                    } else {
                        format!("webterm::{}", target)
                    };
                    if let Ok(level) = parse_level(level_str.trim()) {
                        overrides.insert(full_target, level);
                    }
                }
            }
        }

        Self {
            preset,
            overrides,
            format,
        }
    }

    /// Build an EnvFilter from this configuration.
    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let mut directives: Vec<String> = match self.preset {
            LogPreset::Production => vec![
                "webterm::startup=info".into(),
                "webterm::api=info".into(),
                "webterm::exec=info".into(),
                "webterm::complete=warn".into(),
                "webterm::listing=warn".into(),
                "tower_http=warn".into(),
            ],
            LogPreset::Verbose => vec!["webterm=info".into(), "tower_http=info".into()],
            LogPreset::Debug => vec!["webterm=debug".into(), "tower_http=debug".into()],
            LogPreset::Trace => vec!["webterm=trace".into(), "tower_http=trace".into()],
            LogPreset::Quiet => vec!["webterm=warn".into(), "tower_http=error".into()],
        };

        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level_to_str(*level)));
        }

        let filter_str = directives.join(",");
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_level(s: &str) -> Result<Level, ()> {
    match s.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(()),
    }
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Initialize the tracing subscriber with the given configuration.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_preset_priority() {
        let config = LogConfig::from_cli(true, true, true, true, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Quiet);

        let config = LogConfig::from_cli(true, true, true, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Trace);

        let config = LogConfig::from_cli(true, false, false, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Verbose);

        let config = LogConfig::from_cli(false, false, false, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Production);
    }

    #[test]
    fn test_override_parsing_prefixes_bare_targets() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["exec=debug".into(), "webterm::api=trace,tower_http=info".into()],
            LogFormat::Text,
        );

        assert_eq!(config.overrides.get("webterm::exec"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("webterm::api"), Some(&Level::TRACE));
        assert_eq!(config.overrides.get("tower_http"), Some(&Level::INFO));
    }
}
