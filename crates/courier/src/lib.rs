//! # Courier
//!
//! Header-routed messaging between independent service processes.
//!
//! ## Overview
//!
//! Services publish events on one shared headers exchange and receive them
//! through bindings that match on message headers rather than routing keys.
//! A service declares handler types; each gets its own queue and a small pool
//! of consumers, every consumer with its own handler instance.
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────┐     ┌─ reports.ReportHandler ──▶ 3 consumers
//! send_message ─────▶ │ headers exchange │ ────┼─ reports.AuditHandler  ──▶ 3 consumers
//! post_error   ─────▶ │  (amq.headers)   │     └─ aqcu-errors           ──▶ error handlers
//!                     └──────────────────┘
//! ```
//!
//! - **Core** (`courier-core`): headers, predicates, handler capabilities and
//!   the broker seam
//! - **Transport** (`courier-transport`): an in-memory headers exchange and an
//!   AMQP broker (`amqp` feature)
//! - **Runtime** (`courier-runtime`): configuration, logging, consumer pools,
//!   publishing, error subscriptions and the process runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Default)]
//! struct ReportHandler;
//!
//! #[async_trait::async_trait]
//! impl Handler for ReportHandler {
//!     async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult {
//!         tracing::info!(headers = %headers.to_json(), bytes = body.len(), "Report received");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ServiceRuntime::builder()
//!         .service_name("reports")
//!         .handler(HandlerDescriptor::of::<ReportHandler>())
//!         .build()
//!         .await?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `amqp`: connect to an AMQP 0-9-1 broker

pub use courier_core as core;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

pub use courier_core::*;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{MessageService, ServiceRuntime};

    // Handler capabilities, headers and the publish API
    pub use courier_core::prelude::*;

    // Brokers
    pub use courier_transport::MemoryBroker;
    #[cfg(feature = "amqp")]
    pub use courier_transport::AmqpBroker;
}
