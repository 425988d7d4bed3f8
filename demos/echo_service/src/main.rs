//! Echo Service Example
//!
//! A small service with one handler type, `EchoHandler`. Messages whose
//! headers carry `serviceName=<name>` and `handlerType=EchoHandler`, or
//! `echo=true`, land on the `<name>.EchoHandler` queue and are logged by one
//! of its three consumers. A body that is not UTF-8 is answered with an
//! error event for the message's request.
//!
//! With `--demo` the service also publishes a few messages to itself and an
//! error event for a request it subscribed to.
//!
//! # Usage
//!
//! ```bash
//! # Against a local broker (see `courier.toml` / `COURIER_BROKER__HOST`)
//! cargo run --package echo-service -- --name echo
//!
//! # Fully in-process
//! cargo run --package echo-service -- --memory --demo
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use courier::prelude::*;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "echo-service", about = "Courier echo service")]
struct Args {
    /// Service name; overrides `service.name` from the configuration.
    #[arg(long, default_value = "echo")]
    name: String,

    /// Configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(long)]
    profile: Option<String>,

    /// Use the in-process broker instead of AMQP.
    #[arg(long)]
    memory: bool,

    /// Publish demo traffic after start-up.
    #[arg(long)]
    demo: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Logs every message delivered to its queue.
struct EchoHandler {
    client: SharedClient,
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult {
        let text = match std::str::from_utf8(body) {
            Ok(text) => text,
            Err(e) => {
                let request_id = headers.get_str(keys::REQUEST_ID);
                self.client
                    .post_error(request_id.as_deref(), None, &ErrorReport::of(&e))
                    .await;
                return Ok(());
            }
        };
        let publisher = headers.get_str(keys::PUBLISHED_BY).unwrap_or_default();
        info!(published_by = %publisher, "Echo: {text}");
        Ok(())
    }

    fn bindings(&self, _service_name: &str) -> Vec<HeaderPredicate> {
        HeaderPredicate::all([("echo", true)]).into_iter().collect()
    }
}

/// Logs error events of the requests it was registered for.
struct ErrorLogger;

#[async_trait]
impl ErrorHandler for ErrorLogger {
    async fn handle_error(
        &self,
        request_id: Option<String>,
        service_request_id: Option<String>,
        error_type: Option<String>,
        message: String,
    ) -> HandlerResult {
        warn!(
            request_id = request_id.as_deref().unwrap_or("-"),
            service_request_id = service_request_id.as_deref().unwrap_or("-"),
            error_type = error_type.as_deref().unwrap_or("-"),
            "Request failed: {message}"
        );
        Ok(())
    }
}

// ============================================================================
// Demo Traffic
// ============================================================================

async fn publish_demo(service: &MessageService) -> Result<()> {
    let name = service.service_name().to_string();

    for i in 1..=3 {
        let headers = Headers::new()
            .with(keys::SERVICE_NAME, name.as_str())
            .with(keys::HANDLER_TYPE, "EchoHandler");
        service
            .send_message(headers, format!("hello #{i}").as_bytes())
            .await;
    }

    service
        .send_message(Headers::new().with("echo", true), b"routed by attribute")
        .await;

    service
        .register_error_handler(Some("req-1"), None, None, ErrorLogger)
        .await?;
    service
        .register_error_handler(Some("req-2"), None, None, ErrorLogger)
        .await?;
    service
        .send_request_message(
            Some("req-2"),
            None,
            Headers::new().with("echo", true),
            &[0xff, 0xfe],
        )
        .await;
    service
        .post_error(
            Some("req-1"),
            None,
            &ErrorReport::new("TimeoutError", "upstream did not answer in time"),
        )
        .await;

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ServiceRuntime::builder()
        .service_name(args.name.as_str())
        .handler(HandlerDescriptor::with_client("EchoHandler", |client| EchoHandler { client }));

    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile.as_str());
    }
    if args.memory {
        builder = builder.broker(Arc::new(MemoryBroker::new()));
    }

    let runtime = builder.build().await?;
    info!(queues = ?runtime.service().queues(), "Echo service started");

    if args.demo {
        if let Err(e) = publish_demo(runtime.service()).await {
            error!(error = %e, "Demo traffic failed");
        }
        // Give the consumers a moment before the demo run ends
        runtime
            .run_until(tokio::time::sleep(Duration::from_secs(1)))
            .await?;
        return Ok(());
    }

    runtime.run().await?;

    Ok(())
}
