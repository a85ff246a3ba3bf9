use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging according to the configured format
pub fn init_from_config(config: &LoggingConfig) {
    match config.format {
        LogFormat::Json => init_logging(&config.filter),
        LogFormat::Pretty => init_logging_pretty(&config.filter),
    }
}

/// Initialize logging with structured JSON output
pub fn init_logging(default_filter: &str) {
    // RUST_LOG wins over the configured default
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .json();

    // try_init so repeated initialization in tests is harmless
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    tracing::info!("Logging initialized");
}

/// Initialize logging with pretty output for development
pub fn init_logging_pretty(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    tracing::info!("Logging initialized (pretty mode)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init() {
        // Only checks that initialization (twice) doesn't panic
        init_from_config(&LoggingConfig {
            format: LogFormat::Pretty,
            filter: "debug".to_string(),
        });
        init_logging("info");
    }
}
