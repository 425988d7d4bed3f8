//! Binding installer.
//!
//! Installs the header predicates of a queue as bindings on the shared
//! exchange. Each predicate is bound independently with an empty routing
//! key: a failed binding is logged and the remaining predicates are still
//! attempted. Bindings are never removed; they go away only with their queue.

use tracing::{debug, error, warn};

use courier_core::{BoxedBroker, Channel, HeaderPredicate};

/// Binds queues to the shared exchange.
#[derive(Clone)]
pub struct BindingInstaller {
    broker: BoxedBroker,
    exchange: String,
}

impl BindingInstaller {
    /// Creates an installer for `exchange`.
    pub fn new(broker: BoxedBroker, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
        }
    }

    /// Returns the exchange name.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Binds `queue` once per predicate on a dedicated short-lived channel.
    ///
    /// Returns the number of predicates bound successfully.
    pub async fn install(&self, queue: &str, predicates: &[HeaderPredicate]) -> usize {
        let channel = match self.broker.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                error!(queue = %queue, error = %e, "Cannot open channel for bindings");
                return 0;
            }
        };

        let installed = self.bind_all(channel.as_ref(), queue, predicates).await;

        let id = channel.id();
        if let Err(e) = channel.close().await {
            warn!(queue = %queue, channel = id, error = %e, "Failed to close binding channel");
        }

        installed
    }

    async fn bind_all(&self, channel: &dyn Channel, queue: &str, predicates: &[HeaderPredicate]) -> usize {
        let mut installed = 0;
        for predicate in predicates {
            match channel.bind_queue(queue, &self.exchange, predicate).await {
                Ok(()) => {
                    debug!(queue = %queue, exchange = %self.exchange, predicate = %predicate, "Binding installed");
                    installed += 1;
                }
                Err(e) => {
                    error!(queue = %queue, predicate = %predicate, error = %e, "Failed to install binding");
                }
            }
        }
        installed
    }
}
