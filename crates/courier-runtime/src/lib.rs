//! Courier Runtime - orchestration layer of the Courier messaging layer.
//!
//! This crate provides:
//! - Configuration loading and validation (`config`)
//! - Logging setup (`logging`)
//! - The set-once service identity (`ServiceRegistry`)
//! - Binding installation, consumer pools, publishing and error
//!   subscriptions, tied together by `MessageService`
//! - A process runtime with signal handling (`ServiceRuntime`)
//!
//! ```ignore
//! use courier_runtime::ServiceRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ServiceRuntime::builder()
//!         .service_name("reports")
//!         .handler(HandlerDescriptor::of::<ReportHandler>())
//!         .build()
//!         .await?;
//!
//!     runtime
//!         .service()
//!         .send_message(Headers::new().with("format", "pdf"), b"...")
//!         .await;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Broker
//!
//! With the `amqp` feature the runtime connects to the broker described by
//! the `broker` configuration section. Without it, a broker must be supplied
//! through `ServiceRuntimeBuilder::broker`, e.g. a
//! `courier_transport::MemoryBroker`.

pub mod bindings;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod pool;
pub mod publisher;
pub mod runtime;
pub mod service;
pub mod subscription;

// Re-exports
pub use bindings::BindingInstaller;
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, ServiceConfigBuilder, ServiceInfo,
};
pub use error::{IdentityError, RuntimeError, RuntimeResult};
pub use identity::ServiceRegistry;
pub use logging::{LoggingBuilder, SpanEvents};
pub use pool::ConsumerSet;
pub use publisher::Publisher;
pub use runtime::{ServiceRuntime, ServiceRuntimeBuilder};
pub use service::{MessageService, MessagingSettings};
pub use subscription::{DEFAULT_ERROR_QUEUE, ErrorRegistrar};
