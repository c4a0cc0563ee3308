//! Structured logging initialization
//!
//! Provides consistent logging initialization across the harness.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that keeps the tracing subscriber active.
/// Drop this at the end of main to flush logs.
pub struct LogGuard;

/// Map a configured `log_level` string onto a `tracing::Level`, defaulting
/// unrecognized or empty values to `INFO`.
fn level_for(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warning" | "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        _ => tracing::Level::INFO,
    }
}

/// Initialize structured logging at the given default level.
///
/// `RUST_LOG` still takes precedence when set; `level` only supplies the
/// default directive used when it isn't.
///
/// # Example
/// ```ignore
/// let _guard = init_logging("info");
/// info!("Starting up...");
/// ```
pub fn init_logging(level: &str) -> LogGuard {
    let default_level = level_for(level);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let format = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();

    LogGuard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_for_recognizes_known_levels() {
        assert_eq!(level_for("error"), tracing::Level::ERROR);
        assert_eq!(level_for("ERROR"), tracing::Level::ERROR);
        assert_eq!(level_for("warning"), tracing::Level::WARN);
        assert_eq!(level_for("warn"), tracing::Level::WARN);
        assert_eq!(level_for("debug"), tracing::Level::DEBUG);
        assert_eq!(level_for("info"), tracing::Level::INFO);
    }

    #[test]
    fn level_for_defaults_unknown_to_info() {
        assert_eq!(level_for("bogus"), tracing::Level::INFO);
        assert_eq!(level_for(""), tracing::Level::INFO);
    }
}
