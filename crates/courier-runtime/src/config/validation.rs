//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BrokerConfig, CourierConfig, LogOutput, LoggingConfig, MessagingConfig};

/// Validates the entire configuration.
///
/// The `service` section is validated separately by
/// [`ServiceConfigBuilder`](super::ServiceConfigBuilder).
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_broker_config(&config.broker)?;
    validate_messaging_config(&config.messaging)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates broker settings.
fn validate_broker_config(broker: &BrokerConfig) -> ConfigResult<()> {
    if broker.host.trim().is_empty() {
        return Err(ConfigError::missing_field("broker.host"));
    }

    if broker.port == 0 {
        return Err(ConfigError::InvalidPort(broker.port));
    }

    if broker.exchange.trim().is_empty() {
        return Err(ConfigError::missing_field("broker.exchange"));
    }

    if broker.close_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Broker close timeout must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates queue and consumer settings.
fn validate_messaging_config(messaging: &MessagingConfig) -> ConfigResult<()> {
    if messaging.consumers_per_handler == 0 {
        return Err(ConfigError::validation(
            "At least one consumer per handler is required",
        ));
    }

    if messaging.error_queue.trim().is_empty() {
        return Err(ConfigError::missing_field("messaging.error_queue"));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = CourierConfig::default();
        config.messaging.consumers_per_handler = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = CourierConfig::default();
        config.broker.exchange = " ".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        let mut config = CourierConfig::default();
        config.broker.port = 0;
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidPort(0))));

        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
