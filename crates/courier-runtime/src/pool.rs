//! Consumer pools.
//!
//! Every handler type gets one private queue named
//! `<serviceName>.<handlerTypeName>` and a fixed number of competing
//! consumers. Each consumer owns a dedicated channel and a handler instance
//! built just for it, so a handler is never called concurrently.
//!
//! ```text
//!                        ┌──▶ consumer 1 (channel, handler instance)
//! reports.ReportHandler ─┼──▶ consumer 2 (channel, handler instance)
//!                        └──▶ consumer 3 (channel, handler instance)
//! ```
//!
//! Deliveries are acknowledged automatically. A handler error is logged and
//! the message is not redelivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use courier_core::{
    BoxedBroker, BoxedChannel, BoxedHandler, BrokerResult, Delivery, DeliveryStream,
    HandlerDescriptor, QueueSpec, SharedClient,
};

use crate::bindings::BindingInstaller;

/// The consumer tasks of one service, sharing one cancellation token.
pub struct ConsumerSet {
    broker: BoxedBroker,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    live: Arc<AtomicUsize>,
}

impl ConsumerSet {
    /// Creates an empty set.
    pub fn new(broker: BoxedBroker) -> Self {
        Self {
            broker,
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of running consumers.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Declares the queue of `descriptor`, installs its bindings and starts
    /// `size` consumers, each with a fresh handler instance built around
    /// `client`.
    ///
    /// Returns the queue name, or `None` when the queue could not be declared.
    /// Consumers that fail to start are logged and skipped.
    pub async fn start_pool(
        &self,
        installer: &BindingInstaller,
        service_name: &str,
        descriptor: &HandlerDescriptor,
        size: usize,
        client: &SharedClient,
    ) -> Option<String> {
        let queue = descriptor.queue_name(service_name);

        let queue = match self.declare(&QueueSpec::private(&queue)).await {
            Ok(name) => name,
            Err(e) => {
                error!(queue = %queue, handler = %descriptor.type_name(), error = %e, "Failed to declare handler queue, skipping handler");
                return None;
            }
        };

        installer
            .install(&queue, &descriptor.bindings(service_name, client))
            .await;

        let mut started = 0;
        for _ in 0..size {
            match self.spawn(&queue, descriptor.instantiate(client)).await {
                Ok(()) => started += 1,
                Err(e) => {
                    error!(queue = %queue, handler = %descriptor.type_name(), error = %e, "Failed to register consumer");
                }
            }
        }

        info!(queue = %queue, handler = %descriptor.type_name(), consumers = started, "Handler registered");
        Some(queue)
    }

    /// Declares a queue on a short-lived channel.
    pub async fn declare(&self, spec: &QueueSpec) -> BrokerResult<String> {
        let channel = self.broker.open_channel().await?;
        let result = channel.declare_queue(spec).await;
        close_channel(channel, &spec.name).await;
        result
    }

    /// Starts one consumer of `queue` on its own channel.
    pub async fn spawn(&self, queue: &str, handler: BoxedHandler) -> BrokerResult<()> {
        let channel = self.broker.open_channel().await?;
        let stream = match channel.consume(queue).await {
            Ok(stream) => stream,
            Err(e) => {
                close_channel(channel, queue).await;
                return Err(e);
            }
        };

        let span = info_span!("consumer", queue = %queue, channel = channel.id());
        let task = run_consumer(
            queue.to_string(),
            channel,
            stream,
            handler,
            self.token.child_token(),
            Arc::clone(&self.live),
        );

        self.live.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().push(tokio::spawn(task.instrument(span)));
        Ok(())
    }

    /// Cancels every consumer and waits up to `timeout` for them to stop.
    pub async fn shutdown(&self, timeout: Duration) {
        self.token.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();

        let all = futures::future::join_all(tasks);
        match tokio::time::timeout(timeout, all).await {
            Ok(_) => debug!(consumers = count, "Consumers stopped"),
            Err(_) => warn!(consumers = self.live(), "Consumers still running after shutdown timeout"),
        }
    }
}

/// Delivers messages from `stream` to `handler` until cancelled or the
/// stream ends, then closes the consumer's channel.
async fn run_consumer(
    queue: String,
    channel: BoxedChannel,
    mut stream: DeliveryStream,
    handler: BoxedHandler,
    token: CancellationToken,
    live: Arc<AtomicUsize>,
) {
    debug!("Consumer started");
    loop {
        let delivery: Delivery = tokio::select! {
            _ = token.cancelled() => break,
            next = stream.next() => match next {
                Some(delivery) => delivery,
                None => {
                    debug!("Delivery stream ended");
                    break;
                }
            },
        };

        if let Err(e) = handler.handle(&delivery.headers, &delivery.body).await {
            error!(error = %e, "Handler failed");
        }
    }

    drop(stream);
    close_channel(channel, &queue).await;
    live.fetch_sub(1, Ordering::SeqCst);
    debug!("Consumer stopped");
}

async fn close_channel(channel: BoxedChannel, queue: &str) {
    let id = channel.id();
    if let Err(e) = channel.close().await {
        warn!(queue = %queue, channel = id, error = %e, "Failed to close channel");
    }
}
