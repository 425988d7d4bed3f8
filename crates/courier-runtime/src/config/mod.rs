//! Configuration module for the Courier runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for the service identity, broker connection, messaging and logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod service;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BrokerConfig, CourierConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    MessagingConfig, ServiceConfig, SpanEventConfig,
};
pub use service::{ServiceConfigBuilder, ServiceInfo};
pub use validation::validate_config;
