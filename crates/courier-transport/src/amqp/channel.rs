//! AMQP channel implementation.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel as LapinChannel};
use tracing::{trace, warn};

use courier_core::{
    BrokerError, BrokerResult, Channel, Delivery, DeliveryStream, HeaderPredicate,
    OutboundMessage, QueueSpec,
};

use super::convert::{from_field_table, to_field_table};

/// Reply code of a normal channel close.
const REPLY_SUCCESS: u16 = 200;

/// A channel on an [`AmqpBroker`](super::AmqpBroker).
pub struct AmqpChannel {
    inner: LapinChannel,
}

impl AmqpChannel {
    pub(super) fn new(inner: LapinChannel) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Channel for AmqpChannel {
    fn id(&self) -> u16 {
        self.inner.id()
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> BrokerResult<String> {
        let options = QueueDeclareOptions {
            exclusive: spec.exclusive,
            auto_delete: spec.auto_delete,
            durable: spec.durable,
            ..QueueDeclareOptions::default()
        };

        let queue = self
            .inner
            .queue_declare(&spec.name, options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Declare {
                queue: spec.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        predicate: &HeaderPredicate,
    ) -> BrokerResult<()> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                "",
                QueueBindOptions::default(),
                to_field_table(&predicate.to_arguments()),
            )
            .await
            .map_err(|e| BrokerError::Bind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, exchange: &str, message: &OutboundMessage) -> BrokerResult<()> {
        let publish_error = |e: lapin::Error| BrokerError::Publish {
            exchange: exchange.to_string(),
            reason: e.to_string(),
        };

        let properties = BasicProperties::default().with_headers(to_field_table(&message.headers));
        self.inner
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<DeliveryStream> {
        let options = BasicConsumeOptions {
            no_ack: true,
            ..BasicConsumeOptions::default()
        };

        let consumer = self
            .inner
            .basic_consume(queue, "", options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        let queue = queue.to_string();
        let stream = consumer.filter_map(move |result| {
            let queue = queue.clone();
            async move {
                match result {
                    Ok(delivery) => {
                        let headers = delivery
                            .properties
                            .headers()
                            .as_ref()
                            .map(from_field_table)
                            .unwrap_or_default();
                        trace!(queue = %queue, len = delivery.data.len(), "Delivery received");
                        Some(Delivery::new(headers, delivery.data))
                    }
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "Consumer error");
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        let id = self.inner.id();
        self.inner
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| BrokerError::ChannelClose {
                channel: id,
                reason: e.to_string(),
            })
    }
}
