//! Logging configuration.

use super::parse::EnvSource;

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable, for local runs.
    Pretty,
}

/// Logging configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (from LOG_LEVEL or RUST_LOG).
    pub filter: String,
    /// LOG_FORMAT: json (default) or pretty.
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Load configuration from environment variables.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG > default
    ///
    /// LOG_LEVEL accepts simple values: trace, debug, info, warn, error
    /// RUST_LOG accepts full tracing filter syntax: microsvc=debug,hyper=warn
    pub fn from_env() -> Self {
        let lookup = |key: &str| std::env::var(key).ok();
        Self::from_source(&EnvSource::new(&lookup))
    }

    pub(crate) fn from_source(env: &EnvSource<'_>) -> Self {
        let format = match env.opt("LOG_FORMAT").as_deref() {
            Some(f) if f.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        Self {
            filter: Self::resolve_log_filter(env),
            format,
        }
    }

    /// Resolve log filter.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG > default (info)
    fn resolve_log_filter(env: &EnvSource<'_>) -> String {
        // 1. Check LOG_LEVEL first (simple: debug, info, warn, error)
        if let Some(level) = env.opt("LOG_LEVEL") {
            let level = level.to_lowercase();
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {
                    return format!("microsvc={}", level);
                }
                _ => {
                    // Logging is not up yet.
                    eprintln!(
                        "Warning: Invalid LOG_LEVEL '{}', expected: trace, debug, info, warn, error",
                        level
                    );
                }
            }
        }

        // 2. Check RUST_LOG (full tracing filter syntax)
        if let Some(filter) = env.opt("RUST_LOG") {
            return filter;
        }

        // 3. Default
        "microsvc=info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "microsvc=info".to_string(),
            format: LogFormat::Json,
        }
    }
}
