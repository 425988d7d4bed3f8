//! Channels and consumer streams of the in-memory broker.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tracing::trace;

use courier_core::{
    BrokerError, BrokerResult, Channel, Delivery, DeliveryStream, HeaderPredicate,
    OutboundMessage, QueueSpec,
};

use super::{Fault, Shared};

/// A channel on a [`MemoryBroker`](super::MemoryBroker).
pub struct MemoryChannel {
    id: u16,
    shared: Arc<Shared>,
    /// Consumers started on this channel: `(queue, consumer id)`.
    consumers: Mutex<Vec<(String, u64)>>,
}

impl MemoryChannel {
    pub(super) fn new(id: u16, shared: Arc<Shared>) -> Self {
        Self {
            id,
            shared,
            consumers: Mutex::new(Vec::new()),
        }
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.shared.state.lock().closed {
            return Err(BrokerError::Connection("broker is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> u16 {
        self.id
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> BrokerResult<String> {
        self.ensure_open()?;
        if self.shared.take_fault(|f| matches!(f, Fault::Declare(q) if *q == spec.name)) {
            return Err(BrokerError::Declare {
                queue: spec.name.clone(),
                reason: "injected fault".into(),
            });
        }
        self.shared.state.lock().declare(spec)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        predicate: &HeaderPredicate,
    ) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.shared.take_fault(|f| matches!(f, Fault::Bind(q) if q == queue)) {
            return Err(BrokerError::Bind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                reason: "injected fault".into(),
            });
        }
        self.shared.state.lock().bind(queue, exchange, predicate)
    }

    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.shared.take_fault(|f| matches!(f, Fault::Publish)) {
            return Err(BrokerError::Publish {
                exchange: exchange.to_string(),
                reason: "injected fault".into(),
            });
        }
        self.shared.state.lock().publish(exchange, message);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<DeliveryStream> {
        self.ensure_open()?;
        if self.shared.take_fault(|f| matches!(f, Fault::Consume(q) if q == queue)) {
            return Err(BrokerError::Consume {
                queue: queue.to_string(),
                reason: "injected fault".into(),
            });
        }

        let (sender, receiver) = mpsc::unbounded();
        let id = self.shared.state.lock().attach(queue, sender)?;
        self.consumers.lock().push((queue.to_string(), id));
        trace!(channel = self.id, queue = %queue, consumer = id, "Consumer attached");

        Ok(ConsumerStream {
            receiver,
            shared: Arc::downgrade(&self.shared),
            queue: queue.to_string(),
            id,
        }
        .boxed())
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        let consumers = std::mem::take(&mut *self.consumers.lock());
        {
            let mut state = self.shared.state.lock();
            for (queue, id) in &consumers {
                state.detach(queue, *id);
            }
        }
        self.shared.record_close();

        if self.shared.take_fault(|f| matches!(f, Fault::CloseChannel)) {
            return Err(BrokerError::ChannelClose {
                channel: self.id,
                reason: "injected fault".into(),
            });
        }
        trace!(channel = self.id, "Channel closed");
        Ok(())
    }
}

/// Delivery stream of one consumer; detaches the consumer when dropped.
struct ConsumerStream {
    receiver: UnboundedReceiver<Delivery>,
    shared: Weak<Shared>,
    queue: String,
    id: u64,
}

impl Stream for ConsumerStream {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for ConsumerStream {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.state.lock().detach(&self.queue, self.id);
        }
    }
}
