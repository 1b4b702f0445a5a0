use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Engine and captcha intervals/timeouts are non-zero
/// - Provider and solver base URLs are set
/// - Queue and buffer sizes are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let durations = [
        ("engine.scan_interval_ms", config.engine.scan_interval_ms),
        (
            "engine.rush_retry_interval_ms",
            config.engine.rush_retry_interval_ms,
        ),
        ("engine.rush_window_secs", config.engine.rush_window_secs),
        ("engine.stop_timeout_ms", config.engine.stop_timeout_ms),
        ("engine.auto_run_interval_ms", config.engine.auto_run_interval_ms),
        ("captcha.pool_tick_ms", config.captcha.pool_tick_ms),
        ("captcha.fill_deadline_ms", config.captcha.fill_deadline_ms),
        ("captcha.acquire_timeout_ms", config.captcha.acquire_timeout_ms),
        ("captcha.solve_timeout_ms", config.captcha.solve_timeout_ms),
        ("provider.timeout_secs", config.provider.timeout_secs),
        ("solver.timeout_secs", config.solver.timeout_secs),
    ];
    for (name, value) in durations {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", name)));
        }
    }

    if config.provider.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "provider.base_url cannot be empty".to_string(),
        ));
    }
    if config.solver.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "solver.base_url cannot be empty".to_string(),
        ));
    }

    if config.notifier.queue_size == 0 {
        return Err(ConfigError::ValidationError(
            "notifier.queue_size cannot be 0".to_string(),
        ));
    }
    if config.log_bus.capacity == 0 || config.log_bus.subscriber_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "log_bus sizes cannot be 0".to_string(),
        ));
    }

    Ok(())
}
