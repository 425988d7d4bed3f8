//! Unified error types for the Courier core.
//!
//! This module provides the error types shared by every layer: broker faults
//! raised by transport implementations, and the contract violations raised
//! synchronously when predicates or error subscriptions are built from
//! invalid input. Runtime-level errors live in `courier-runtime`.

use thiserror::Error;

// =============================================================================
// Broker Errors
// =============================================================================

/// Errors that can occur while talking to the message broker.
///
/// Reasons are carried as strings so the error stays `Clone` regardless of
/// the transport that produced it.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// The broker connection could not be established or was lost.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// A channel could not be opened.
    #[error("failed to open channel: {0}")]
    ChannelOpen(String),

    /// A channel could not be closed cleanly.
    #[error("failed to close channel {channel}: {reason}")]
    ChannelClose {
        /// The channel number.
        channel: u16,
        /// Reason for failure.
        reason: String,
    },

    /// Queue declaration failed.
    #[error("failed to declare queue '{queue}': {reason}")]
    Declare {
        /// The queue name.
        queue: String,
        /// Reason for failure.
        reason: String,
    },

    /// The queue exists with different properties.
    #[error("queue '{queue}' already exists with different properties")]
    PreconditionFailed {
        /// The queue name.
        queue: String,
    },

    /// Queue binding failed.
    #[error("failed to bind queue '{queue}' to '{exchange}': {reason}")]
    Bind {
        /// The queue name.
        queue: String,
        /// The exchange name.
        exchange: String,
        /// Reason for failure.
        reason: String,
    },

    /// Publishing to the exchange failed.
    #[error("failed to publish to '{exchange}': {reason}")]
    Publish {
        /// The exchange name.
        exchange: String,
        /// Reason for failure.
        reason: String,
    },

    /// Registering a consumer failed.
    #[error("failed to consume from '{queue}': {reason}")]
    Consume {
        /// The queue name.
        queue: String,
        /// Reason for failure.
        reason: String,
    },

    /// The referenced queue does not exist.
    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    /// The operation did not finish within its deadline.
    #[error("broker operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

// =============================================================================
// Contract Errors
// =============================================================================

/// Errors raised when building a header predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    /// A predicate must match on at least one attribute.
    #[error("header predicate must contain at least one attribute")]
    Empty,

    /// The `x-match` value was neither `all` nor `any`.
    #[error("unknown match mode '{0}', expected 'all' or 'any'")]
    UnknownMatchMode(String),
}

/// Errors raised when an error subscription is requested with invalid filters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Neither a request id nor a service request id was supplied.
    #[error("error handlers must be tied to a request id or a service request id")]
    MissingRequestId,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result type returned by message handlers.
///
/// Handlers are application code; any error type is accepted and only logged.
pub type HandlerResult = anyhow::Result<()>;
