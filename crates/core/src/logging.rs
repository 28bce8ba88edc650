//! Logging setup.
//!
//! Logs go to stderr so that stdout stays reserved for answers and `--json`
//! output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Initialize the global tracing subscriber.
///
/// `log_level` takes precedence over `RUST_LOG`; the fallback is `info`.
/// Colour is disabled when `no_color` is set or `NO_COLOR` is present.
///
/// # Example
/// ```no_run
/// use cyclecare_core::logging::init_logging;
///
/// init_logging(Some("debug"), false).expect("logging");
/// ```
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    let filter = resolve_filter(log_level);

    let env_filter = EnvFilter::try_new(&filter)
        .map_err(|e| AppError::Config(format!("Invalid log filter '{}': {}", filter, e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(!no_color && std::env::var_os("NO_COLOR").is_none());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

fn resolve_filter(log_level: Option<&str>) -> String {
    match log_level {
        Some(level) => level.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
    }
}
