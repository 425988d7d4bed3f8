//! The messaging service of one process.
//!
//! [`MessageService`] ties the pieces together: at start it stands up one
//! queue and a consumer pool per handler type, then serves publishes and
//! error-handler registrations until it is closed.
//!
//! Handler instances receive the service's publisher as their
//! [`SharedClient`], so a handler can publish while handling a delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use courier_core::{
    BoxedBroker, DEFAULT_EXCHANGE, ErrorHandler, ErrorReport, ErrorSubscription, HandlerSet,
    Headers, MessagingClient, SharedClient, SubscriptionError,
};

use crate::bindings::BindingInstaller;
use crate::config::CourierConfig;
use crate::pool::ConsumerSet;
use crate::publisher::Publisher;
use crate::subscription::{DEFAULT_ERROR_QUEUE, ErrorRegistrar};

/// Tunables of a [`MessageService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingSettings {
    /// The shared headers exchange.
    pub exchange: String,
    /// Consumers (and handler instances) per handler type.
    pub consumers_per_handler: usize,
    /// The shared error queue.
    pub error_queue: String,
    /// Upper bound on the graceful shutdown.
    pub close_timeout: Duration,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            consumers_per_handler: 3,
            error_queue: DEFAULT_ERROR_QUEUE.to_string(),
            close_timeout: Duration::from_secs(3),
        }
    }
}

impl MessagingSettings {
    /// Reads the settings from the `broker` and `messaging` sections.
    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            exchange: config.broker.exchange.clone(),
            consumers_per_handler: config.messaging.consumers_per_handler,
            error_queue: config.messaging.error_queue.clone(),
            close_timeout: config.broker.close_timeout(),
        }
    }
}

/// Publishes messages and runs the consumers of one service.
pub struct MessageService {
    service_name: String,
    broker: BoxedBroker,
    settings: MessagingSettings,
    publisher: Arc<Publisher>,
    consumers: Arc<ConsumerSet>,
    errors: ErrorRegistrar,
    queues: Vec<String>,
    closed: AtomicBool,
}

impl MessageService {
    /// Starts the consumer pools of every handler in `handlers`.
    ///
    /// A handler whose queue cannot be set up is logged and skipped; the
    /// service starts with the remaining ones.
    pub async fn start(
        service_name: &str,
        handlers: &HandlerSet,
        broker: BoxedBroker,
        settings: MessagingSettings,
    ) -> Self {
        let installer = BindingInstaller::new(Arc::clone(&broker), settings.exchange.as_str());
        let consumers = Arc::new(ConsumerSet::new(Arc::clone(&broker)));
        let publisher = Arc::new(Publisher::new(
            Arc::clone(&broker),
            settings.exchange.as_str(),
            service_name,
        ));
        let client: SharedClient = publisher.clone();

        let mut queues = Vec::with_capacity(handlers.len());
        for descriptor in handlers.iter() {
            if let Some(queue) = consumers
                .start_pool(
                    &installer,
                    service_name,
                    descriptor,
                    settings.consumers_per_handler,
                    &client,
                )
                .await
            {
                queues.push(queue);
            }
        }

        if queues.len() < handlers.len() {
            warn!(
                service = %service_name,
                registered = queues.len(),
                declared = handlers.len(),
                "Some handlers could not be registered"
            );
        }
        info!(
            service = %service_name,
            broker = broker.kind(),
            queues = queues.len(),
            consumers = consumers.live(),
            "Message service started"
        );

        Self {
            service_name: service_name.to_string(),
            publisher,
            errors: ErrorRegistrar::new(settings.error_queue.as_str(), installer, Arc::clone(&consumers)),
            broker,
            settings,
            consumers,
            queues,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the service name stamped on published messages.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the settings the service was started with.
    pub fn settings(&self) -> &MessagingSettings {
        &self.settings
    }

    /// Returns the handler queues that were set up, in declaration order.
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Returns the number of running consumers, error queue included.
    pub fn consumer_count(&self) -> usize {
        self.consumers.live()
    }

    /// Returns the number of registered error subscriptions.
    pub fn error_subscriptions(&self) -> usize {
        self.errors.len()
    }

    /// Registers an error handler for one request.
    ///
    /// Fails before touching the broker when both identifiers are absent.
    /// Broker failures are logged.
    pub async fn register_error_handler<E: ErrorHandler>(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        error_type: Option<&str>,
        handler: E,
    ) -> Result<(), SubscriptionError> {
        let subscription = ErrorSubscription::new(request_id, service_request_id, error_type)?;
        self.subscribe_errors(subscription, handler).await;
        Ok(())
    }

    /// Registers an error handler behind a prepared subscription.
    pub async fn subscribe_errors<E: ErrorHandler>(&self, subscription: ErrorSubscription, handler: E) {
        self.errors.register(subscription, handler).await;
    }

    /// Returns whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops every consumer and closes the broker connection.
    ///
    /// Each step waits at most the configured close timeout. Calling it again
    /// does nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(service = %self.service_name, "Closing message service");
        self.consumers.shutdown(self.settings.close_timeout).await;

        match self.broker.close(self.settings.close_timeout).await {
            Ok(()) => info!(service = %self.service_name, "Message service closed"),
            Err(e) => error!(service = %self.service_name, error = %e, "Failed to close broker connection"),
        }
    }
}

#[async_trait]
impl MessagingClient for MessageService {
    async fn send_message(&self, headers: Headers, body: &[u8]) {
        self.publisher.send(headers, body).await;
    }

    async fn post_error(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        report: &ErrorReport,
    ) {
        self.publisher
            .send_error(request_id, service_request_id, report)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use courier_core::{
        Handler, HandlerDescriptor, HandlerResult, HeaderPredicate, MatchMode, keys,
    };
    use courier_transport::{Fault, MemoryBroker};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Reports;

    #[async_trait]
    impl Handler for Reports {
        async fn handle(&self, _headers: &Headers, _body: &[u8]) -> HandlerResult {
            Ok(())
        }

        fn bindings(&self, _service_name: &str) -> Vec<HeaderPredicate> {
            vec![
                HeaderPredicate::all([("format", "pdf")]).unwrap(),
                HeaderPredicate::any([("priority", "high"), ("audit", "true")]).unwrap(),
            ]
        }
    }

    #[derive(Default)]
    struct Audit;

    #[async_trait]
    impl Handler for Audit {
        async fn handle(&self, _headers: &Headers, _body: &[u8]) -> HandlerResult {
            Ok(())
        }
    }

    struct Echo {
        client: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, _headers: &Headers, body: &[u8]) -> HandlerResult {
            self.client.send(body.to_vec())?;
            Ok(())
        }
    }

    /// Answers every order with a confirmation and reports rejected ones.
    struct Orders {
        client: SharedClient,
    }

    #[async_trait]
    impl Handler for Orders {
        async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult {
            let request_id = headers.get_str(keys::REQUEST_ID);
            if body == b"reject" {
                let report = ErrorReport::new("RejectedOrder", "order rejected");
                self.client
                    .post_error(request_id.as_deref(), None, &report)
                    .await;
                return Ok(());
            }

            let reply = Headers::new()
                .with(keys::SERVICE_NAME, "reports")
                .with(keys::HANDLER_TYPE, "Echo");
            self.client
                .send_request_message(request_id.as_deref(), None, reply, b"confirmed")
                .await;
            Ok(())
        }
    }

    struct Forward(mpsc::UnboundedSender<(Option<String>, String)>);

    #[async_trait]
    impl ErrorHandler for Forward {
        async fn handle_error(
            &self,
            request_id: Option<String>,
            _service_request_id: Option<String>,
            _error_type: Option<String>,
            message: String,
        ) -> HandlerResult {
            let _ = self.0.send((request_id, message));
            Ok(())
        }
    }

    fn handlers() -> HandlerSet {
        HandlerSet::new()
            .with(HandlerDescriptor::of::<Reports>())
            .with(HandlerDescriptor::of::<Audit>())
    }

    async fn start(broker: &MemoryBroker, handlers: &HandlerSet) -> MessageService {
        MessageService::start(
            "reports",
            handlers,
            Arc::new(broker.clone()),
            MessagingSettings::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_one_queue_per_handler_with_all_bindings() {
        let broker = MemoryBroker::new();
        let service = start(&broker, &handlers()).await;

        assert_eq!(service.queues(), ["reports.Reports", "reports.Audit"]);
        assert_eq!(broker.queue_names().len(), 2);
        assert_eq!(broker.bindings("reports.Reports").len(), 3);
        assert_eq!(broker.bindings("reports.Audit").len(), 1);

        let default = &broker.bindings("reports.Audit")[0];
        assert_eq!(default.match_mode(), MatchMode::All);
        assert_eq!(default, &HeaderPredicate::for_handler("reports", "Audit"));

        assert_eq!(broker.consumer_count("reports.Reports"), 3);
        assert_eq!(broker.consumer_count("reports.Audit"), 3);
        assert_eq!(service.consumer_count(), 6);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_affect_others() {
        let broker = MemoryBroker::new();
        broker.fail_next(Fault::Declare("reports.Reports".into()));
        let service = start(&broker, &handlers()).await;

        assert_eq!(service.queues(), ["reports.Audit"]);
        assert_eq!(broker.consumer_count("reports.Audit"), 3);
    }

    #[tokio::test]
    async fn test_consumer_pool_size_follows_settings() {
        let broker = MemoryBroker::new();
        let settings = MessagingSettings {
            consumers_per_handler: 1,
            ..MessagingSettings::default()
        };
        let service = MessageService::start("svc", &handlers(), Arc::new(broker.clone()), settings).await;

        assert_eq!(service.consumer_count(), 2);
    }

    #[tokio::test]
    async fn test_send_message_reaches_handler_queue() {
        let broker = MemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handlers = HandlerSet::new().with(HandlerDescriptor::new("Echo", move || Echo {
            client: tx.clone(),
        }));
        let service = start(&broker, &handlers).await;

        let headers = Headers::new()
            .with(keys::SERVICE_NAME, "reports")
            .with(keys::HANDLER_TYPE, "Echo");
        service.send_message(headers, b"hello").await;

        let body = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, b"hello");

        let (_, message) = &broker.published()[0];
        assert_eq!(message.headers.get_str(keys::PUBLISHED_BY).as_deref(), Some("reports"));
    }

    #[tokio::test]
    async fn test_handler_publishes_while_handling() {
        let broker = MemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handlers = HandlerSet::new()
            .with(HandlerDescriptor::with_client("Orders", |client| Orders { client }))
            .with(HandlerDescriptor::new("Echo", move || Echo { client: tx.clone() }));
        let service = start(&broker, &handlers).await;
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        service
            .register_error_handler(Some("order-2"), None, None, Forward(errors_tx))
            .await
            .unwrap();

        let order = Headers::new()
            .with(keys::SERVICE_NAME, "reports")
            .with(keys::HANDLER_TYPE, "Orders");
        service
            .send_request_message(Some("order-1"), None, order.clone(), b"place")
            .await;
        service
            .send_request_message(Some("order-2"), None, order, b"reject")
            .await;

        let reply = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, b"confirmed");

        let event = tokio::time::timeout(Duration::from_secs(1), errors_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, (Some("order-2".to_string()), "order rejected".to_string()));

        let confirmation = broker
            .published()
            .into_iter()
            .find(|(_, message)| message.body == b"confirmed")
            .unwrap();
        assert_eq!(
            confirmation.1.headers.get_str(keys::REQUEST_ID).as_deref(),
            Some("order-1")
        );
        assert_eq!(
            confirmation.1.headers.get_str(keys::PUBLISHED_BY).as_deref(),
            Some("reports")
        );
    }

    #[tokio::test]
    async fn test_send_request_message_fills_identifiers() {
        let broker = MemoryBroker::new();
        let service = start(&broker, &HandlerSet::new()).await;

        let headers = Headers::new().with(keys::REQUEST_ID, "caller-set");
        service
            .send_request_message(Some("req-1"), Some("svc-1"), headers, b"")
            .await;

        let (_, message) = &broker.published()[0];
        assert_eq!(message.headers.get_str(keys::REQUEST_ID).as_deref(), Some("caller-set"));
        assert_eq!(message.headers.get_str(keys::SERVICE_REQUEST_ID).as_deref(), Some("svc-1"));
        assert_eq!(message.headers.len(), 4);
    }

    #[tokio::test]
    async fn test_register_error_handler_without_ids_fails_before_broker() {
        let broker = MemoryBroker::new();
        let service = start(&broker, &HandlerSet::new()).await;
        let opened = broker.channels_opened();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = service
            .register_error_handler(None, None, Some("TimeoutError"), Forward(tx))
            .await;

        assert_eq!(result, Err(SubscriptionError::MissingRequestId));
        assert_eq!(broker.channels_opened(), opened);
        assert!(broker.queue_spec(DEFAULT_ERROR_QUEUE).is_none());
    }

    #[tokio::test]
    async fn test_post_error_round_trip() {
        let broker = MemoryBroker::new();
        let service = start(&broker, &HandlerSet::new()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        service
            .register_error_handler(Some("req-2"), None, None, Forward(tx))
            .await
            .unwrap();
        service
            .post_error(Some("req-2"), Some("svc-9"), &ErrorReport::new("TimeoutError", "boom"))
            .await;

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, (Some("req-2".to_string()), "boom".to_string()));
        assert_eq!(service.error_subscriptions(), 1);
        assert_eq!(service.consumer_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases_everything() {
        let broker = MemoryBroker::new();
        let service = start(&broker, &handlers()).await;

        service.close().await;
        service.close().await;

        assert!(service.is_closed());
        assert!(broker.is_closed());
        assert_eq!(service.consumer_count(), 0);
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_publish_after_close_is_dropped() {
        let broker = MemoryBroker::new();
        let service = start(&broker, &HandlerSet::new()).await;
        service.close().await;

        service.send_message(Headers::new(), b"late").await;
        assert!(broker.published().is_empty());
    }
}
