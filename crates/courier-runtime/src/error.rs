//! Runtime error types.

use thiserror::Error;

use courier_core::{BrokerError, SubscriptionError};

pub use crate::config::{ConfigError, ConfigResult};

/// Errors raised by the service identity registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The service name was empty or whitespace.
    #[error("Service name must not be blank")]
    BlankName,

    /// The handler set was empty.
    #[error("Handler set must not be empty")]
    EmptyHandlerSet,

    /// A different service name was already set.
    #[error("Service name already set to '{current}', ignoring '{attempted}'")]
    NameConflict { current: String, attempted: String },

    /// The handler set was already set.
    #[error("Handlers already set ({current} handler types), ignoring new set")]
    HandlersConflict { current: usize },

    /// The messaging service was requested before a service name was set.
    #[error("Service name has not been set")]
    NameNotSet,
}

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Service identity error.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Broker error.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Invalid error subscription.
    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// No broker was supplied and none could be created.
    #[error("No broker available: {0}")]
    NoBroker(String),

    /// Installing a signal handler failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
