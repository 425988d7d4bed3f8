//! Service runtime.
//!
//! [`ServiceRuntime`] runs one service process: it loads the configuration,
//! initializes logging, fixes the service identity, connects the broker and
//! starts the [`MessageService`]. It then waits for Ctrl+C / SIGTERM (or a
//! caller-supplied future) and shuts the service down within the configured
//! close timeout.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::ServiceRuntime;
//!
//! let runtime = ServiceRuntime::builder()
//!     .config_file("courier.toml")
//!     .handler(HandlerDescriptor::of::<ReportHandler>())
//!     .build()
//!     .await?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tracing::{debug, error, info};

use courier_core::{BoxedBroker, HandlerDescriptor, HandlerSet};

use crate::config::{
    ConfigLoader, CourierConfig, ServiceConfigBuilder, ServiceInfo, validate_config,
};
use crate::error::RuntimeResult;
use crate::identity::ServiceRegistry;
use crate::logging;
use crate::service::{MessageService, MessagingSettings};

/// A running service process.
pub struct ServiceRuntime {
    config: CourierConfig,
    descriptor: Option<ServiceInfo>,
    registry: Arc<ServiceRegistry>,
    service: Arc<MessageService>,
}

impl ServiceRuntime {
    /// Creates a runtime builder.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let runtime = ServiceRuntime::builder()
    ///     .profile("production")
    ///     .service_name("reports")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> ServiceRuntimeBuilder {
        ServiceRuntimeBuilder::new()
    }

    /// Returns the loaded configuration.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Returns the validated service descriptor.
    ///
    /// `None` when the `service` section lacks a port or address and the
    /// descriptor was not [required](ServiceRuntimeBuilder::require_descriptor).
    pub fn descriptor(&self) -> Option<&ServiceInfo> {
        self.descriptor.as_ref()
    }

    /// Returns the identity registry.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Returns the messaging service.
    pub fn service(&self) -> &Arc<MessageService> {
        &self.service
    }

    /// Runs until a shutdown signal is received, then closes the service.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!(
            service = %self.service.service_name(),
            "Courier service is running. Press Ctrl+C to stop."
        );

        let result = wait_for_shutdown().await;
        self.close().await;
        result
    }

    /// Runs until `shutdown` completes, then closes the service.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.close().await;
        Ok(())
    }

    /// Closes the messaging service and the broker connection.
    pub async fn close(&self) {
        self.service.close().await;
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// ServiceRuntimeBuilder
// =============================================================================

/// Builder for a [`ServiceRuntime`].
pub struct ServiceRuntimeBuilder {
    config_loader: ConfigLoader,
    service_name: Option<String>,
    handlers: HandlerSet,
    broker: Option<BoxedBroker>,
    init_logging: bool,
    require_descriptor: bool,
}

impl ServiceRuntimeBuilder {
    /// Creates a builder that searches the current directory for configuration.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            service_name: None,
            handlers: HandlerSet::new(),
            broker: None,
            init_logging: true,
            require_descriptor: false,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides `service.name` from the configuration.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Adds a handler type.
    pub fn handler(mut self, descriptor: HandlerDescriptor) -> Self {
        self.handlers.insert(descriptor);
        self
    }

    /// Uses `broker` instead of connecting to the configured one.
    pub fn broker(mut self, broker: BoxedBroker) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Leaves logging setup to the caller.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Fails the build when the service descriptor is incomplete.
    pub fn require_descriptor(mut self) -> Self {
        self.require_descriptor = true;
        self
    }

    /// Loads the configuration and starts the service.
    ///
    /// Configuration errors, including an incomplete descriptor when one is
    /// required, are returned before the broker is contacted.
    pub async fn build(self) -> RuntimeResult<ServiceRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let name = self
            .service_name
            .unwrap_or_else(|| config.service.name.clone());

        let descriptor = match ServiceConfigBuilder::from_config(&config.service)
            .name(name.as_str())
            .build()
        {
            Ok(info) => {
                info!(
                    service = %info.name,
                    id = %info.id,
                    version = %info.version,
                    address = %info.address,
                    port = info.port,
                    "Service descriptor"
                );
                Some(info)
            }
            Err(e) if self.require_descriptor => {
                error!(error = %e, "Service descriptor incomplete");
                return Err(e.into());
            }
            Err(e) => {
                debug!(error = %e, "Service descriptor incomplete");
                None
            }
        };

        let broker = match self.broker {
            Some(broker) => broker,
            None => connect(&config).await?,
        };

        let registry = Arc::new(ServiceRegistry::new(
            broker,
            MessagingSettings::from_config(&config),
        ));
        registry.set_service_name(&name)?;
        if !self.handlers.is_empty() {
            registry.set_handlers(self.handlers)?;
        }
        let service = registry.instance().await?;

        Ok(ServiceRuntime {
            config,
            descriptor,
            registry,
            service,
        })
    }
}

impl Default for ServiceRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "amqp")]
async fn connect(config: &CourierConfig) -> RuntimeResult<BoxedBroker> {
    use courier_transport::AmqpBroker;

    info!(host = %config.broker.host, port = config.broker.port, vhost = %config.broker.vhost, "Connecting to broker");
    let broker = AmqpBroker::connect(&config.broker.amqp_uri()).await?;
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "amqp"))]
async fn connect(_config: &CourierConfig) -> RuntimeResult<BoxedBroker> {
    Err(crate::error::RuntimeError::NoBroker(
        "built without the `amqp` feature; supply one with `ServiceRuntimeBuilder::broker`".into(),
    ))
}
