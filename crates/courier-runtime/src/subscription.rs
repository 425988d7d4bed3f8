//! Error subscriptions.
//!
//! Error events of every service travel through one shared, non-exclusive
//! queue. Each registration adds its own `all` predicate as a binding on that
//! queue; bindings accumulate and are never removed.
//!
//! A process runs a single consumer on the shared queue and hands every
//! delivery to each local subscription whose predicate matches the headers.
//! Two registrations in the same process therefore never steal each other's
//! events.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use courier_core::{
    ErrorHandler, ErrorHandlerAdapter, ErrorSubscription, Handler, HandlerResult, HeaderPredicate,
    Headers, QueueSpec,
};

use crate::bindings::BindingInstaller;
use crate::pool::ConsumerSet;

/// Well-known name of the shared error queue.
pub const DEFAULT_ERROR_QUEUE: &str = "aqcu-errors";

struct Subscriber {
    predicate: HeaderPredicate,
    handler: Box<dyn Handler>,
}

type Subscribers = Arc<RwLock<Vec<Arc<Subscriber>>>>;

/// Registers error handlers on the shared error queue.
pub struct ErrorRegistrar {
    queue: String,
    installer: BindingInstaller,
    consumers: Arc<ConsumerSet>,
    subscribers: Subscribers,
    /// Whether the shared consumer is running; also serializes registrations.
    consuming: Mutex<bool>,
}

impl ErrorRegistrar {
    /// Creates a registrar for `queue` with no subscriptions.
    pub fn new(
        queue: impl Into<String>,
        installer: BindingInstaller,
        consumers: Arc<ConsumerSet>,
    ) -> Self {
        Self {
            queue: queue.into(),
            installer,
            consumers,
            subscribers: Arc::new(RwLock::new(Vec::new())),
            consuming: Mutex::new(false),
        }
    }

    /// Returns the error queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns the number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns whether no subscription is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `handler` behind `subscription`.
    ///
    /// Declares the shared queue if needed, binds the subscription predicate
    /// and starts the queue consumer on first use. Returns `false` when the
    /// queue could not be declared; other failures are logged and the
    /// subscription stays registered.
    pub async fn register<E: ErrorHandler>(&self, subscription: ErrorSubscription, handler: E) -> bool {
        let mut consuming = self.consuming.lock().await;

        if let Err(e) = self.consumers.declare(&QueueSpec::shared(&self.queue)).await {
            error!(queue = %self.queue, error = %e, "Failed to declare error queue, error handler not registered");
            return false;
        }

        let predicate = subscription.predicate();
        self.subscribers.write().push(Arc::new(Subscriber {
            predicate: predicate.clone(),
            handler: Box::new(ErrorHandlerAdapter::new(subscription, handler)),
        }));

        if self.installer.install(&self.queue, std::slice::from_ref(&predicate)).await == 0 {
            warn!(queue = %self.queue, predicate = %predicate, "Error subscription registered without a binding");
        }

        if !*consuming {
            let fan_out = FanOut {
                subscribers: Arc::clone(&self.subscribers),
            };
            match self.consumers.spawn(&self.queue, Box::new(fan_out)).await {
                Ok(()) => *consuming = true,
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Failed to start error queue consumer");
                }
            }
        }

        info!(queue = %self.queue, predicate = %predicate, "Error handler registered");
        true
    }
}

/// Consumer-side handler of the shared error queue.
struct FanOut {
    subscribers: Subscribers,
}

#[async_trait]
impl Handler for FanOut {
    async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult {
        let matching: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.predicate.matches(headers))
            .cloned()
            .collect();

        if matching.is_empty() {
            debug!(headers = %headers.to_json(), "No local subscriber for error event");
            return Ok(());
        }

        for subscriber in matching {
            trace!(predicate = %subscriber.predicate, "Dispatching error event");
            if let Err(e) = subscriber.handler.handle(headers, body).await {
                error!(predicate = %subscriber.predicate, error = %e, "Error handler failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use courier_core::{
        Broker, BoxedBroker, DEFAULT_EXCHANGE, MatchMode, OutboundMessage, keys,
    };
    use courier_transport::{Fault, MemoryBroker};
    use tokio::sync::mpsc;

    type Event = (Option<String>, Option<String>, Option<String>, String);

    struct Forward(mpsc::UnboundedSender<Event>);

    #[async_trait]
    impl ErrorHandler for Forward {
        async fn handle_error(
            &self,
            request_id: Option<String>,
            service_request_id: Option<String>,
            error_type: Option<String>,
            message: String,
        ) -> HandlerResult {
            let _ = self.0.send((request_id, service_request_id, error_type, message));
            Ok(())
        }
    }

    fn registrar(broker: &MemoryBroker) -> ErrorRegistrar {
        let shared: BoxedBroker = Arc::new(broker.clone());
        ErrorRegistrar::new(
            DEFAULT_ERROR_QUEUE,
            BindingInstaller::new(Arc::clone(&shared), DEFAULT_EXCHANGE),
            Arc::new(ConsumerSet::new(shared)),
        )
    }

    async fn publish(broker: &MemoryBroker, headers: Headers, body: &str) {
        let channel = broker.open_channel().await.unwrap();
        channel
            .publish(DEFAULT_EXCHANGE, &OutboundMessage::new(headers, body.as_bytes()))
            .await
            .unwrap();
        channel.close().await.unwrap();
    }

    fn error_headers(request_id: &str, error_type: &str) -> Headers {
        Headers::new()
            .with(keys::ERROR, keys::ERROR_MARKER)
            .with(keys::REQUEST_ID, request_id)
            .with(keys::ERROR_TYPE, error_type)
    }

    #[tokio::test]
    async fn test_register_declares_shared_queue_and_binding() {
        let broker = MemoryBroker::new();
        let registrar = registrar(&broker);
        let (tx, _rx) = mpsc::unbounded_channel();

        let subscription = ErrorSubscription::for_request("req-1").with_error_type("TimeoutError");
        assert!(registrar.register(subscription, Forward(tx)).await);

        let spec = broker.queue_spec(DEFAULT_ERROR_QUEUE).unwrap();
        assert!(!spec.exclusive && !spec.auto_delete);

        let bindings = broker.bindings(DEFAULT_ERROR_QUEUE);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].match_mode(), MatchMode::All);
        assert_eq!(
            bindings[0],
            HeaderPredicate::all([
                (keys::ERROR, "error"),
                (keys::REQUEST_ID, "req-1"),
                (keys::ERROR_TYPE, "TimeoutError"),
            ])
            .unwrap()
        );
        assert_eq!(broker.consumer_count(DEFAULT_ERROR_QUEUE), 1);
    }

    #[tokio::test]
    async fn test_matching_event_reaches_handler() {
        let broker = MemoryBroker::new();
        let registrar = registrar(&broker);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registrar
            .register(
                ErrorSubscription::for_request("req-1").with_error_type("TimeoutError"),
                Forward(tx),
            )
            .await;

        publish(&broker, error_headers("req-1", "TimeoutError"), "boom").await;

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            (Some("req-1".into()), None, Some("TimeoutError".into()), "boom".into())
        );
    }

    #[tokio::test]
    async fn test_event_without_request_id_is_not_routed() {
        let broker = MemoryBroker::new();
        let registrar = registrar(&broker);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registrar
            .register(
                ErrorSubscription::for_request("req-1").with_error_type("TimeoutError"),
                Forward(tx),
            )
            .await;

        let headers = Headers::new()
            .with(keys::ERROR, keys::ERROR_MARKER)
            .with(keys::ERROR_TYPE, "TimeoutError");
        publish(&broker, headers, "boom").await;

        let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(got.is_err());
        assert_eq!(broker.backlog_len(DEFAULT_ERROR_QUEUE), 0);
    }

    #[tokio::test]
    async fn test_subscriptions_receive_only_their_own_events() {
        let broker = MemoryBroker::new();
        let registrar = registrar(&broker);
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        registrar
            .register(ErrorSubscription::for_request("req-1"), Forward(first_tx))
            .await;
        registrar
            .register(ErrorSubscription::for_request("req-2"), Forward(second_tx))
            .await;

        // One consumer serves both subscriptions
        assert_eq!(broker.consumer_count(DEFAULT_ERROR_QUEUE), 1);
        assert_eq!(broker.bindings(DEFAULT_ERROR_QUEUE).len(), 2);

        for _ in 0..3 {
            publish(&broker, error_headers("req-2", "E"), "second").await;
        }
        publish(&broker, error_headers("req-1", "E"), "first").await;

        let first = tokio::time::timeout(Duration::from_secs(1), first_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.3, "first");

        for _ in 0..3 {
            let second = tokio::time::timeout(Duration::from_secs(1), second_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(second.3, "second");
        }
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_declare_failure_registers_nothing() {
        let broker = MemoryBroker::new();
        let registrar = registrar(&broker);
        let (tx, _rx) = mpsc::unbounded_channel();

        broker.fail_next(Fault::Declare(DEFAULT_ERROR_QUEUE.into()));
        assert!(!registrar.register(ErrorSubscription::for_request("r"), Forward(tx)).await);
        assert!(registrar.is_empty());
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_consumer_start_is_retried_on_next_registration() {
        let broker = MemoryBroker::new();
        let registrar = registrar(&broker);
        let (tx, _rx) = mpsc::unbounded_channel();

        broker.fail_next(Fault::Consume(DEFAULT_ERROR_QUEUE.into()));
        registrar
            .register(ErrorSubscription::for_request("a"), Forward(tx.clone()))
            .await;
        assert_eq!(broker.consumer_count(DEFAULT_ERROR_QUEUE), 0);

        registrar
            .register(ErrorSubscription::for_request("b"), Forward(tx))
            .await;
        assert_eq!(broker.consumer_count(DEFAULT_ERROR_QUEUE), 1);
        assert_eq!(registrar.len(), 2);
    }
}
