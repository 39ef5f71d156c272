//! Logging setup.
//!
//! Everything goes to stderr; stdout belongs to the response stream.
//! Dependency targets listed in [`QUIET_TARGETS`] are capped at `warn`
//! unless `RUST_LOG` overrides the whole filter.

use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Dependency targets capped at `warn`.
pub const QUIET_TARGETS: &[&str] = &["redis", "handlebars", "mio", "walkdir"];

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, with the active turn span attached.
    Json,
    /// Multi-field human readable lines.
    #[default]
    Pretty,
    /// Single-line human readable output.
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format `{other}` (json, pretty, compact)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        })
    }
}

/// Parse a level name (`trace` through `error`, case-insensitive).
pub fn parse_level(level: &str) -> Result<Level, String> {
    Level::from_str(level.trim()).map_err(|_| {
        format!("unknown log level `{level}` (trace, debug, info, warn, error)")
    })
}

/// Filter directives for `level` with the quiet targets appended.
pub fn filter_directives(level: Level) -> String {
    let base = level.to_string().to_ascii_lowercase();
    QUIET_TARGETS
        .iter()
        .fold(base, |acc, target| format!("{acc},{target}=warn"))
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
}

/// Install the global subscriber.
///
/// Unknown level or format strings fall back to `info` / pretty with a
/// warning. Calling this more than once is harmless.
pub fn init_logging(log_level: &str, log_format: &str) {
    let level = parse_level(log_level);
    let format = log_format.parse::<LogFormat>();
    let registry = tracing_subscriber::registry().with(build_filter(
        level.as_ref().copied().unwrap_or(Level::INFO),
    ));

    let installed = match format.as_ref().copied().unwrap_or_default() {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };
    if installed.is_err() {
        return;
    }

    if let Err(e) = level {
        tracing::warn!(error = %e, "Falling back to info level");
    }
    if let Err(e) = format {
        tracing::warn!(error = %e, "Falling back to pretty output");
    }
    tracing::debug!(quiet_targets = QUIET_TARGETS.len(), "Logging initialized");
}

/// Short id attached to every turn span.
pub fn generate_turn_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_turn_id() {
        let a = generate_turn_id();
        let b = generate_turn_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" compact ".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default().to_string(), "pretty");
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(parse_level("DEBUG"), Ok(Level::DEBUG));
        assert!(parse_level("loud").is_err());
        let directives = filter_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("redis=warn"));
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("debug", "pretty");
        init_logging("nope", "json");
    }
}
