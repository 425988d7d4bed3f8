//! # Courier Transport
//!
//! Broker implementations for the Courier messaging layer.
//!
//! This crate provides concrete implementations of the [`Broker`] and
//! [`Channel`] seams defined in `courier-core`.
//!
//! ## Features
//!
//! - `amqp`: [`AmqpBroker`], an AMQP 0-9-1 client built on `lapin`
//!
//! The in-memory broker is always available.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  courier-runtime    │  (installer, consumer pools, publisher)
//! ├─────────────────────┤
//! │  courier-core       │  (Broker / Channel traits)
//! ├─────────────────────┤
//! │  courier-transport  │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  RabbitMQ / memory  │
//! └─────────────────────┘
//! ```
//!
//! ## Implementations
//!
//! | Broker | Description | Use Case |
//! |--------|-------------|----------|
//! | [`MemoryBroker`] | In-process headers exchange | Tests, local development |
//! | `AmqpBroker` | AMQP client | Production |
//!
//! [`Broker`]: courier_core::Broker
//! [`Channel`]: courier_core::Channel

pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use memory::{Fault, MemoryBroker};

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
