//! # Courier Core
//!
//! The core types of the Courier messaging layer.
//!
//! Courier lets a service exchange messages with other services through a
//! single headers exchange. Routing is decided by message header attributes
//! rather than routing keys: every handler queue is bound with one or more
//! [`HeaderPredicate`]s and receives the messages whose headers satisfy them.
//!
//! ## Architecture Layers
//!
//! Courier Core is organized into three architectural layers:
//!
//! ### Foundation Layer
//!
//! Core data types:
//! - **Headers**: Attribute maps and reserved keys ([`Headers`], [`HeaderValue`], [`keys`])
//! - **Messages**: Outbound messages, deliveries and error events ([`OutboundMessage`],
//!   [`Delivery`], [`ErrorReport`])
//!
//! ### Framework Layer
//!
//! Routing and handling:
//! - **Predicates**: Binding clauses and their builder ([`HeaderPredicate`], [`PredicateBuilder`])
//! - **Handlers**: The handler capability and its descriptors ([`Handler`], [`HandlerDescriptor`])
//! - **Error Subscriptions**: Error handlers tied to a request ([`ErrorHandler`],
//!   [`ErrorSubscription`])
//!
//! ### Integration Layer
//!
//! External system interfaces:
//! - **Broker Seam**: Channel-level broker operations ([`Broker`], [`Channel`], [`QueueSpec`])
//! - **Messaging Client**: The publish-side API ([`MessagingClient`])
//!
//! ## Routing Overview
//!
//! ```text
//! ┌───────────┐  headers   ┌────────────┐  all{serviceName, handlerType}  ┌─────────────────────┐
//! │ Publisher │──────────▶│ amq.headers │───────────────────────────────▶│ svc.ReportHandler ×3│
//! └───────────┘            └────────────┘──┐                              └─────────────────────┘
//!                                          │ all{error=error, requestId}  ┌─────────────────────┐
//!                                          └─────────────────────────────▶│ shared error queue  │
//!                                                                         └─────────────────────┘
//! ```

// Architectural layers
pub mod error;
pub mod foundation;
pub mod framework;
pub mod integration;

// Re-export error types
pub use error::{BrokerError, BrokerResult, HandlerResult, PredicateError, SubscriptionError};

// Re-export foundation types
pub use foundation::{Delivery, ErrorReport, HeaderValue, Headers, OutboundMessage, keys};

// Re-export framework types
pub use framework::{
    BoxedHandler, ErrorHandler, ErrorHandlerAdapter, ErrorSubscription, Handler,
    HandlerDescriptor, HandlerFactory, HandlerSet, HeaderPredicate, MATCH_ARGUMENT, MatchMode,
    PredicateBuilder, simple_type_name,
};

// Re-export integration types
pub use integration::{
    BoxedBroker, BoxedChannel, Broker, Channel, DEFAULT_EXCHANGE, DeliveryStream,
    MessagingClient, QueueSpec, SharedClient,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{HandlerResult, SubscriptionError};
    pub use super::foundation::*;
    pub use super::framework::{
        ErrorHandler, ErrorSubscription, Handler, HandlerDescriptor, HandlerSet, HeaderPredicate,
        MatchMode,
    };
    pub use super::integration::{MessagingClient, SharedClient};
}
