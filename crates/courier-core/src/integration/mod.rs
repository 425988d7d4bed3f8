//! Integration layer - External system interfaces.
//!
//! This module contains the seams towards systems outside the core:
//! - Broker and channel traits implemented by transports
//! - The publish-side messaging client used by application code

pub mod broker;
pub mod client;

pub use broker::{
    BoxedBroker, BoxedChannel, Broker, Channel, DEFAULT_EXCHANGE, DeliveryStream, QueueSpec,
};
pub use client::{MessagingClient, SharedClient};
