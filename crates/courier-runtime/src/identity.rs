//! Service identity registry.
//!
//! The service name and the handler set are each written at most once. The
//! first successful writer wins; every later attempt is logged, reported to
//! its caller and ignored. The [`MessageService`] is built lazily from the
//! identity the first time it is requested.
//!
//! ```rust,ignore
//! let registry = ServiceRegistry::new(broker, MessagingSettings::default());
//! registry.set_service_name("reports")?;
//! registry.set_handlers(HandlerSet::new().with(HandlerDescriptor::of::<ReportHandler>()))?;
//!
//! let service = registry.instance().await?;
//! ```

use std::sync::{Arc, OnceLock};

use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

use courier_core::{BoxedBroker, HandlerSet};

use crate::error::IdentityError;
use crate::service::{MessageService, MessagingSettings};

/// Set-once identity of a service process and the gate to its
/// [`MessageService`].
pub struct ServiceRegistry {
    name: OnceLock<String>,
    handlers: OnceLock<HandlerSet>,
    broker: BoxedBroker,
    settings: MessagingSettings,
    service: OnceCell<Arc<MessageService>>,
}

impl ServiceRegistry {
    /// Creates an empty registry around `broker`.
    pub fn new(broker: BoxedBroker, settings: MessagingSettings) -> Self {
        Self {
            name: OnceLock::new(),
            handlers: OnceLock::new(),
            broker,
            settings,
            service: OnceCell::new(),
        }
    }

    /// Sets the service name.
    ///
    /// Fails when `name` is blank or a name was already set.
    pub fn set_service_name(&self, name: &str) -> Result<(), IdentityError> {
        if name.trim().is_empty() {
            error!("Rejected blank service name");
            return Err(IdentityError::BlankName);
        }

        self.name.set(name.to_string()).map_err(|attempted| {
            let current = self.name.get().cloned().unwrap_or_default();
            warn!(current = %current, attempted = %attempted, "Service name already set");
            IdentityError::NameConflict { current, attempted }
        })?;

        debug!(service = %name, "Service name set");
        Ok(())
    }

    /// Sets the handler types of this service.
    ///
    /// Fails when `handlers` is empty or a handler set was already set.
    /// Requesting the [`instance`](Self::instance) freezes the handler set.
    pub fn set_handlers(&self, handlers: HandlerSet) -> Result<(), IdentityError> {
        if handlers.is_empty() {
            error!("Rejected empty handler set");
            return Err(IdentityError::EmptyHandlerSet);
        }

        let count = handlers.len();
        self.handlers.set(handlers).map_err(|_| {
            let current = self.handlers.get().map_or(0, HandlerSet::len);
            warn!(current, attempted = count, "Handlers already set");
            IdentityError::HandlersConflict { current }
        })?;

        debug!(handlers = count, "Handlers set");
        Ok(())
    }

    /// Returns the service name, if set.
    pub fn service_name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    /// Returns the handler set, if set.
    pub fn handlers(&self) -> Option<&HandlerSet> {
        self.handlers.get()
    }

    /// Returns the messaging service, starting it on first call.
    ///
    /// Fails while no service name is set. Concurrent first callers share a
    /// single start.
    pub async fn instance(&self) -> Result<Arc<MessageService>, IdentityError> {
        let Some(name) = self.name.get() else {
            error!("Messaging service requested before the service name was set");
            return Err(IdentityError::NameNotSet);
        };

        let service = self
            .service
            .get_or_init(|| async {
                let handlers = self.handlers.get_or_init(HandlerSet::new);
                let service = MessageService::start(
                    name,
                    handlers,
                    Arc::clone(&self.broker),
                    self.settings.clone(),
                )
                .await;
                Arc::new(service)
            })
            .await;

        Ok(Arc::clone(service))
    }
}
