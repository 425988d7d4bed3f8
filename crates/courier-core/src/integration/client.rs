//! Publish-side API used by application code.

use std::sync::Arc;

use async_trait::async_trait;

use crate::foundation::{ErrorReport, Headers, keys};

/// Publishes messages and error events on the shared exchange.
///
/// Delivery is best-effort at this layer: implementations log failures and
/// never return them to the caller.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Publishes `body` with `headers`, adding default metadata that the
    /// caller did not set.
    async fn send_message(&self, headers: Headers, body: &[u8]);

    /// Publishes a message tied to a request.
    ///
    /// `requestId` and `serviceRequestId` are added only when present and not
    /// already set by the caller.
    async fn send_request_message(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        mut headers: Headers,
        body: &[u8],
    ) {
        if let Some(request_id) = request_id {
            headers.put_if_absent(keys::REQUEST_ID, request_id);
        }
        if let Some(service_request_id) = service_request_id {
            headers.put_if_absent(keys::SERVICE_REQUEST_ID, service_request_id);
        }
        self.send_message(headers, body).await;
    }

    /// Publishes an error event for a request.
    async fn post_error(
        &self,
        request_id: Option<&str>,
        service_request_id: Option<&str>,
        report: &ErrorReport,
    );
}

/// A messaging client shared between handler instances.
pub type SharedClient = Arc<dyn MessagingClient>;
