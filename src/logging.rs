//! Tracing setup for hosts that do not install their own subscriber

use crate::config::BridgeConfig;

/// Parse log level string to tracing level
pub fn parse_log_level(level: Option<&str>) -> tracing::Level {
    match level {
        Some("trace") => tracing::Level::TRACE,
        Some("debug") => tracing::Level::DEBUG,
        Some("info") => tracing::Level::INFO,
        Some("warn") => tracing::Level::WARN,
        Some("error") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Install a fmt subscriber if logging is enabled. Returns `true` when this
/// call installed it; an already-installed subscriber is left alone.
pub fn init_logging(config: &BridgeConfig) -> bool {
    if !config.enable_logging {
        return false;
    }
    tracing_subscriber::fmt()
        .with_max_level(parse_log_level(config.log_level.as_deref()))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level(Some("trace")), tracing::Level::TRACE);
        assert_eq!(parse_log_level(Some("warn")), tracing::Level::WARN);
        assert_eq!(parse_log_level(Some("verbose")), tracing::Level::INFO);
        assert_eq!(parse_log_level(None), tracing::Level::INFO);
    }

    #[test]
    fn test_disabled_logging_installs_nothing() {
        let config = BridgeConfig {
            enable_logging: false,
            ..BridgeConfig::default()
        };
        assert!(!init_logging(&config));
    }
}
