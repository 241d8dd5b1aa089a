//! Process-wide logging setup.
//!
//! `tracing` events are written by a fmt subscriber filtered by `RUST_LOG`
//! (falling back to the given directive); `log` records from the storage
//! layer are bridged into the same subscriber.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops; the returned flag
/// says whether this process's subscriber is ours.
pub fn init_logging(default_filter: &str) -> bool {
    init_logging_with(default_filter, LogFormat::Text)
}

pub fn init_logging_with(default_filter: &str, format: LogFormat) -> bool {
    *INSTALLED.get_or_init(|| install(default_filter, format))
}

fn install(default_filter: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Err(e) = tracing_log::LogTracer::init() {
        // Another logger owns the `log` facade; tracing events still work.
        eprintln!("log bridge not installed: {e}");
    }

    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            eprintln!("tracing subscriber not installed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_logging_twice_is_safe() {
        let first = init_logging("debug");
        let second = init_logging_with("info", LogFormat::Json);
        assert_eq!(first, second);
        log::info!("bridged log record");
        tracing::info!("tracing event");
    }
}
