//! Message dispatcher.
//!
//! Every publish runs on its own short-lived channel that is closed on all
//! exit paths. Failures are logged and dropped; nothing is returned to the
//! caller.

use async_trait::async_trait;
use tracing::{Instrument, debug, error, info_span, trace, warn};

use courier_core::{BoxedBroker, ErrorReport, Headers, MessagingClient, OutboundMessage, keys};

/// Publishes messages on behalf of one service.
#[derive(Clone)]
pub struct Publisher {
    broker: BoxedBroker,
    exchange: String,
    service_name: String,
}

impl Publisher {
    /// Creates a publisher stamping `service_name` on the messages it sends.
    pub fn new(broker: BoxedBroker, exchange: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            service_name: service_name.into(),
        }
    }

    /// Adds `msrvLoggable` and `msrvPublishedBy` unless the caller set them.
    pub fn fill_defaults(&self, headers: &mut Headers) {
        headers.put_if_absent(keys::LOGGABLE, true);
        headers.put_if_absent(keys::PUBLISHED_BY, self.service_name.as_str());
    }

    /// Builds the headers of an error event.
    ///
    /// Absent identifiers are left out rather than published as empty values.
    pub fn error_headers(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        report: &ErrorReport,
    ) -> Headers {
        let mut headers = Headers::new();
        self.fill_defaults(&mut headers);
        headers.put_if_absent(keys::ERROR, keys::ERROR_MARKER);
        headers.put_if_absent(keys::ERROR_TYPE, report.error_type());
        if let Some(request_id) = request_id {
            headers.put_if_absent(keys::REQUEST_ID, request_id);
        }
        if let Some(service_request_id) = service_request_id {
            headers.put_if_absent(keys::SERVICE_REQUEST_ID, service_request_id);
        }
        headers
    }

    /// Publishes `body` with `headers` after filling the default metadata.
    pub async fn send(&self, mut headers: Headers, body: &[u8]) {
        self.fill_defaults(&mut headers);
        self.publish(OutboundMessage::new(headers, body)).await;
    }

    /// Publishes an error event whose body is the report message.
    pub async fn send_error(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        report: &ErrorReport,
    ) {
        let headers = self.error_headers(request_id, service_request_id, report);
        self.publish(OutboundMessage::new(headers, report.message().as_bytes()))
            .await;
    }

    async fn publish(&self, message: OutboundMessage) {
        let span = info_span!("publish", exchange = %self.exchange);
        async {
            trace!(headers = %message.headers.to_json(), "Publishing message");

            let channel = match self.broker.open_channel().await {
                Ok(channel) => channel,
                Err(e) => {
                    error!(error = %e, "Cannot open channel, message dropped");
                    return;
                }
            };
            let id = channel.id();

            match channel.publish(&self.exchange, &message).await {
                Ok(()) => debug!(channel = id, bytes = message.body.len(), "Message published"),
                Err(e) => error!(channel = id, error = %e, "Failed to publish message"),
            }

            if let Err(e) = channel.close().await {
                warn!(channel = id, error = %e, "Failed to close publish channel");
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl MessagingClient for Publisher {
    async fn send_message(&self, headers: Headers, body: &[u8]) {
        self.send(headers, body).await;
    }

    async fn post_error(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        report: &ErrorReport,
    ) {
        self.send_error(request_id, service_request_id, report).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use courier_core::{DEFAULT_EXCHANGE, HeaderValue};
    use courier_transport::{Fault, MemoryBroker};

    fn publisher(broker: &MemoryBroker) -> Publisher {
        Publisher::new(Arc::new(broker.clone()), DEFAULT_EXCHANGE, "reports")
    }

    #[tokio::test]
    async fn test_empty_headers_get_exactly_the_defaults() {
        let broker = MemoryBroker::new();
        publisher(&broker).send(Headers::new(), b"payload").await;

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let (exchange, message) = &published[0];
        assert_eq!(exchange, DEFAULT_EXCHANGE);
        assert_eq!(message.headers.len(), 2);
        assert_eq!(message.headers.get_bool(keys::LOGGABLE), Some(true));
        assert_eq!(message.headers.get_str(keys::PUBLISHED_BY).as_deref(), Some("reports"));
        assert_eq!(message.body, b"payload");
    }

    #[tokio::test]
    async fn test_caller_headers_are_never_overwritten() {
        let broker = MemoryBroker::new();
        let headers = Headers::new()
            .with(keys::LOGGABLE, false)
            .with(keys::PUBLISHED_BY, "someone-else")
            .with("format", "pdf");
        publisher(&broker).send(headers, b"").await;

        let (_, message) = &broker.published()[0];
        assert_eq!(message.headers.get(keys::LOGGABLE), Some(&HeaderValue::Bool(false)));
        assert_eq!(message.headers.get_str(keys::PUBLISHED_BY).as_deref(), Some("someone-else"));
        assert_eq!(message.headers.get_str("format").as_deref(), Some("pdf"));
    }

    #[tokio::test]
    async fn test_error_event_shape() {
        let broker = MemoryBroker::new();
        let report = ErrorReport::new("TimeoutError", "boom");
        publisher(&broker)
            .send_error(Some("req-2"), Some("svc-9"), &report)
            .await;

        let (_, message) = &broker.published()[0];
        assert_eq!(message.body, b"boom");
        let headers = &message.headers;
        assert_eq!(headers.get_str(keys::ERROR).as_deref(), Some("error"));
        assert_eq!(headers.get_str(keys::ERROR_TYPE).as_deref(), Some("TimeoutError"));
        assert_eq!(headers.get_str(keys::REQUEST_ID).as_deref(), Some("req-2"));
        assert_eq!(headers.get_str(keys::SERVICE_REQUEST_ID).as_deref(), Some("svc-9"));
        assert_eq!(headers.get_bool(keys::LOGGABLE), Some(true));
        assert_eq!(headers.get_str(keys::PUBLISHED_BY).as_deref(), Some("reports"));
    }

    #[tokio::test]
    async fn test_error_event_omits_absent_identifiers() {
        let broker = MemoryBroker::new();
        let headers = publisher(&broker).error_headers(None, Some("svc-9"), &ErrorReport::new("E", "m"));

        assert!(!headers.contains_key(keys::REQUEST_ID));
        assert!(headers.contains_key(keys::SERVICE_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_publish_failure_releases_channel() {
        let broker = MemoryBroker::new();
        broker.fail_next(Fault::Publish);
        publisher(&broker).send(Headers::new(), b"lost").await;

        assert!(broker.published().is_empty());
        assert_eq!(broker.channels_opened(), 1);
        assert_eq!(broker.channels_closed(), 1);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_publish() {
        let broker = MemoryBroker::new();
        broker.fail_next(Fault::CloseChannel);
        publisher(&broker).send(Headers::new(), b"kept").await;

        assert_eq!(broker.published().len(), 1);
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_drops_message() {
        let broker = MemoryBroker::new();
        broker.fail_next(Fault::OpenChannel);
        publisher(&broker).send(Headers::new(), b"lost").await;

        assert!(broker.published().is_empty());
        assert_eq!(broker.open_channels(), 0);
    }
}
