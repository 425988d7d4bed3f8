//! Error subscriptions and the error-handler capability.
//!
//! Any service may publish an error event tied to a request. Other services
//! observe those events by registering an [`ErrorHandler`] behind an
//! [`ErrorSubscription`], a filter over the request identifiers and the
//! error-kind tag. The subscription is turned into a single `all` predicate
//! that always carries the `error=error` marker.
//!
//! [`ErrorHandlerAdapter`] wraps an error handler so it can be consumed like
//! any other [`Handler`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::handler::Handler;
use super::predicate::{HeaderPredicate, MatchMode};
use crate::error::{HandlerResult, SubscriptionError};
use crate::foundation::{HeaderValue, Headers, keys};

// ============================================================================
// ErrorHandler Trait
// ============================================================================

/// Application capability invoked for every error event it subscribed to.
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    /// Handles one error event.
    ///
    /// Identifiers are taken from the message headers and are `None` when the
    /// publisher did not set them; `message` is the body decoded as UTF-8.
    async fn handle_error(
        &self,
        request_id: Option<String>,
        service_request_id: Option<String>,
        error_type: Option<String>,
        message: String,
    ) -> HandlerResult;
}

#[async_trait]
impl<E: ErrorHandler + ?Sized> ErrorHandler for Arc<E> {
    async fn handle_error(
        &self,
        request_id: Option<String>,
        service_request_id: Option<String>,
        error_type: Option<String>,
        message: String,
    ) -> HandlerResult {
        (**self)
            .handle_error(request_id, service_request_id, error_type, message)
            .await
    }
}

#[async_trait]
impl<E: ErrorHandler + ?Sized> ErrorHandler for Box<E> {
    async fn handle_error(
        &self,
        request_id: Option<String>,
        service_request_id: Option<String>,
        error_type: Option<String>,
        message: String,
    ) -> HandlerResult {
        (**self)
            .handle_error(request_id, service_request_id, error_type, message)
            .await
    }
}

// ============================================================================
// ErrorSubscription
// ============================================================================

/// Filter selecting which error events reach an error handler.
///
/// At least one of the request id and the service request id is always set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorSubscription {
    request_id: Option<String>,
    service_request_id: Option<String>,
    error_type: Option<String>,
}

impl ErrorSubscription {
    /// Creates a subscription.
    ///
    /// Fails when both `request_id` and `service_request_id` are absent.
    pub fn new(
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        error_type: Option<&str>,
    ) -> Result<Self, SubscriptionError> {
        if request_id.is_none() && service_request_id.is_none() {
            return Err(SubscriptionError::MissingRequestId);
        }

        Ok(Self {
            request_id: request_id.map(str::to_string),
            service_request_id: service_request_id.map(str::to_string),
            error_type: error_type.map(str::to_string),
        })
    }

    /// Subscribes to errors of one request.
    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            service_request_id: None,
            error_type: None,
        }
    }

    /// Subscribes to errors of one service-level request.
    pub fn for_service_request(service_request_id: impl Into<String>) -> Self {
        Self {
            request_id: None,
            service_request_id: Some(service_request_id.into()),
            error_type: None,
        }
    }

    /// Narrows the subscription to one error-kind tag.
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Returns the request id filter.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns the service request id filter.
    pub fn service_request_id(&self) -> Option<&str> {
        self.service_request_id.as_deref()
    }

    /// Returns the error-kind filter.
    pub fn error_type(&self) -> Option<&str> {
        self.error_type.as_deref()
    }

    /// Builds the binding predicate of this subscription.
    ///
    /// The predicate is `all` over `error=error` plus every present filter.
    pub fn predicate(&self) -> HeaderPredicate {
        let mut attributes = BTreeMap::new();
        attributes.insert(keys::ERROR.to_string(), HeaderValue::from(keys::ERROR_MARKER));
        let filters = [
            (keys::REQUEST_ID, &self.request_id),
            (keys::SERVICE_REQUEST_ID, &self.service_request_id),
            (keys::ERROR_TYPE, &self.error_type),
        ];
        for (key, value) in filters {
            if let Some(value) = value {
                attributes.insert(key.to_string(), HeaderValue::from(value));
            }
        }

        HeaderPredicate::from_nonempty(MatchMode::All, attributes)
    }
}

// ============================================================================
// ErrorHandlerAdapter
// ============================================================================

/// Adapts an [`ErrorHandler`] to the generic [`Handler`] capability.
///
/// Its single binding is the subscription predicate; on delivery it extracts
/// `requestId`, `serviceRequestId` and `errorType` from the headers and
/// forwards them with the body text.
pub struct ErrorHandlerAdapter<E> {
    subscription: ErrorSubscription,
    handler: E,
}

impl<E: ErrorHandler> ErrorHandlerAdapter<E> {
    /// Wraps `handler` behind `subscription`.
    pub fn new(subscription: ErrorSubscription, handler: E) -> Self {
        Self {
            subscription,
            handler,
        }
    }

    /// Returns the subscription.
    pub fn subscription(&self) -> &ErrorSubscription {
        &self.subscription
    }
}

#[async_trait]
impl<E: ErrorHandler> Handler for ErrorHandlerAdapter<E> {
    async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult {
        self.handler
            .handle_error(
                headers.get_str(keys::REQUEST_ID),
                headers.get_str(keys::SERVICE_REQUEST_ID),
                headers.get_str(keys::ERROR_TYPE),
                String::from_utf8_lossy(body).into_owned(),
            )
            .await
    }

    fn bindings(&self, _service_name: &str) -> Vec<HeaderPredicate> {
        vec![self.subscription.predicate()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Call = (Option<String>, Option<String>, Option<String>, String);

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
    }

    #[async_trait]
    impl ErrorHandler for Recorder {
        async fn handle_error(
            &self,
            request_id: Option<String>,
            service_request_id: Option<String>,
            error_type: Option<String>,
            message: String,
        ) -> HandlerResult {
            self.calls
                .lock()
                .unwrap()
                .push((request_id, service_request_id, error_type, message));
            Ok(())
        }
    }

    #[test]
    fn test_subscription_requires_an_identifier() {
        assert_eq!(
            ErrorSubscription::new(None, None, Some("TimeoutError")),
            Err(SubscriptionError::MissingRequestId)
        );
        assert!(ErrorSubscription::new(None, Some("svc-1"), None).is_ok());
    }

    #[test]
    fn test_predicate_contains_only_present_fields() {
        let subscription = ErrorSubscription::new(Some("req-1"), None, Some("TimeoutError")).unwrap();
        let predicate = subscription.predicate();

        assert_eq!(predicate.match_mode(), MatchMode::All);
        assert_eq!(predicate.attributes().len(), 3);
        assert_eq!(predicate.attribute(keys::ERROR).and_then(|v| v.as_str()), Some("error"));
        assert_eq!(predicate.attribute(keys::REQUEST_ID).and_then(|v| v.as_str()), Some("req-1"));
        assert_eq!(
            predicate.attribute(keys::ERROR_TYPE).and_then(|v| v.as_str()),
            Some("TimeoutError")
        );
        assert!(predicate.attribute(keys::SERVICE_REQUEST_ID).is_none());

        let matching = Headers::new()
            .with(keys::ERROR, "error")
            .with(keys::REQUEST_ID, "req-1")
            .with(keys::ERROR_TYPE, "TimeoutError");
        assert!(predicate.matches(&matching));

        let mut missing = matching.clone();
        missing.remove(keys::REQUEST_ID);
        assert!(!predicate.matches(&missing));
    }

    #[tokio::test]
    async fn test_adapter_forwards_header_fields() {
        let recorder = Arc::new(Recorder::default());
        let adapter = ErrorHandlerAdapter::new(
            ErrorSubscription::for_service_request("svc-9"),
            Arc::clone(&recorder),
        );

        let headers = Headers::new()
            .with(keys::ERROR, "error")
            .with(keys::SERVICE_REQUEST_ID, "svc-9")
            .with(keys::ERROR_TYPE, "io");
        adapter.handle(&headers, b"disk full").await.unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                None,
                Some("svc-9".to_string()),
                Some("io".to_string()),
                "disk full".to_string()
            )]
        );
        assert_eq!(adapter.bindings("any").len(), 1);
    }
}
