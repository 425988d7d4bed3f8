//! Broker seam: the narrow interface Courier needs from a message broker.
//!
//! Courier never talks to a broker library directly. Implementations of
//! [`Broker`] and [`Channel`] live in `courier-transport` (an in-memory
//! headers exchange and an AMQP client); the runtime only needs:
//!
//! - open/close a channel
//! - declare a queue
//! - bind a queue to an exchange with a [`HeaderPredicate`]
//! - publish headers + body to an exchange with an empty routing key
//! - consume a queue with automatic acknowledgment
//!
//! # Channel ownership
//!
//! A [`Channel`] is never shared between concurrent operations. Closing
//! consumes the boxed channel, so a channel is released at most once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BrokerResult;
use crate::foundation::{Delivery, OutboundMessage};
use crate::framework::HeaderPredicate;

/// Name of the broker's built-in headers exchange.
pub const DEFAULT_EXCHANGE: &str = "amq.headers";

// =============================================================================
// QueueSpec
// =============================================================================

/// Declaration parameters of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueSpec {
    /// Queue name.
    pub name: String,
    /// Only the declaring connection may use the queue.
    pub exclusive: bool,
    /// The broker deletes the queue when its last consumer goes away.
    pub auto_delete: bool,
    /// The queue survives a broker restart.
    pub durable: bool,
}

impl QueueSpec {
    /// A private handler queue: exclusive, auto-delete, non-durable.
    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exclusive: true,
            auto_delete: true,
            durable: false,
        }
    }

    /// A shared queue: non-exclusive, non-durable, never auto-deleted.
    ///
    /// Lives for the broker's lifetime so that any number of consumers can
    /// attach over time.
    pub fn shared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exclusive: false,
            auto_delete: false,
            durable: false,
        }
    }
}

// =============================================================================
// Broker / Channel
// =============================================================================

/// Stream of deliveries from one consumer.
///
/// The stream ends when the consumer is cancelled or its channel closes.
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// A connection to a message broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Returns a short name of the implementation, used in logs.
    fn kind(&self) -> &'static str;

    /// Opens a new channel.
    async fn open_channel(&self) -> BrokerResult<BoxedChannel>;

    /// Closes the connection, waiting at most `timeout`.
    async fn close(&self, timeout: Duration) -> BrokerResult<()>;
}

/// A single broker channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Returns the channel number.
    fn id(&self) -> u16;

    /// Declares a queue, returning its name.
    ///
    /// Re-declaring an existing queue with the same parameters is a no-op.
    async fn declare_queue(&self, spec: &QueueSpec) -> BrokerResult<String>;

    /// Binds a queue to a headers exchange with an empty routing key.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        predicate: &HeaderPredicate,
    ) -> BrokerResult<()>;

    /// Publishes a message to an exchange with an empty routing key.
    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> BrokerResult<()>;

    /// Starts consuming a queue with automatic acknowledgment.
    async fn consume(&self, queue: &str) -> BrokerResult<DeliveryStream>;

    /// Closes the channel.
    async fn close(self: Box<Self>) -> BrokerResult<()>;
}

/// A shared broker connection.
pub type BoxedBroker = Arc<dyn Broker>;

/// An exclusively owned channel.
pub type BoxedChannel = Box<dyn Channel>;
