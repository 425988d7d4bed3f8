//! In-process headers exchange.
//!
//! [`MemoryBroker`] implements the [`Broker`] seam without a network. It
//! models the parts of a headers exchange Courier relies on:
//!
//! - `all` / `any` predicates, with `x-` prefixed arguments ignored
//! - a queue receives each published message once, however many of its
//!   bindings match
//! - consumers of one queue compete round-robin
//! - messages routed to a queue without consumers are buffered
//! - an auto-delete queue disappears with its last consumer
//! - re-declaring a queue with different flags fails
//!
//! It also exposes inspection helpers and one-shot fault injection for tests.
//!
//! ```rust,ignore
//! use courier_transport::memory::{Fault, MemoryBroker};
//!
//! let broker = MemoryBroker::new();
//! broker.fail_next(Fault::Publish);
//! ```

mod channel;
mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use courier_core::{
    BoxedChannel, Broker, BrokerError, BrokerResult, HeaderPredicate, OutboundMessage, QueueSpec,
};

pub use channel::MemoryChannel;
use state::BrokerState;

/// A broker operation that can be made to fail once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The next channel open fails.
    OpenChannel,
    /// The next declaration of the named queue fails.
    Declare(String),
    /// The next binding of the named queue fails.
    Bind(String),
    /// The next publish fails.
    Publish,
    /// The next consumer on the named queue fails to start.
    Consume(String),
    /// The next channel close reports an error (the channel is still released).
    CloseChannel,
}

/// State shared by the broker handle and its channels.
pub(crate) struct Shared {
    pub(crate) state: Mutex<BrokerState>,
    faults: Mutex<Vec<Fault>>,
    next_channel: AtomicU16,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Shared {
    /// Removes and reports the first pending fault accepted by `select`.
    pub(crate) fn take_fault(&self, select: impl Fn(&Fault) -> bool) -> bool {
        let mut faults = self.faults.lock();
        match faults.iter().position(select) {
            Some(index) => {
                faults.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// An in-process broker. Clones share the same exchange and queues.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                faults: Mutex::new(Vec::new()),
                next_channel: AtomicU16::new(1),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Makes the next matching operation fail.
    pub fn fail_next(&self, fault: Fault) {
        self.shared.faults.lock().push(fault);
    }

    // ─── Inspection ──────────────────────────────────────────────────────────

    /// Returns the names of all declared queues.
    pub fn queue_names(&self) -> Vec<String> {
        self.shared.state.lock().queues.keys().cloned().collect()
    }

    /// Returns the declaration of a queue.
    pub fn queue_spec(&self, queue: &str) -> Option<QueueSpec> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.spec.clone())
    }

    /// Returns the predicates bound to a queue, in binding order.
    pub fn bindings(&self, queue: &str) -> Vec<HeaderPredicate> {
        self.shared
            .state
            .lock()
            .bindings
            .iter()
            .filter(|b| b.queue == queue)
            .map(|b| b.predicate.clone())
            .collect()
    }

    /// Returns the number of live consumers on a queue.
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.consumers.len())
    }

    /// Returns the number of buffered messages on a queue.
    pub fn backlog_len(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.backlog.len())
    }

    /// Returns every message published so far, with its exchange.
    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.shared.state.lock().published.clone()
    }

    /// Returns the number of channels opened so far.
    pub fn channels_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Returns the number of channels closed so far.
    pub fn channels_closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Returns the number of channels currently open.
    pub fn open_channels(&self) -> usize {
        self.channels_opened()
            .saturating_sub(self.channels_closed())
    }

    /// Returns whether [`Broker::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn open_channel(&self) -> BrokerResult<BoxedChannel> {
        if self.shared.state.lock().closed {
            return Err(BrokerError::Connection("broker is closed".into()));
        }
        if self.shared.take_fault(|f| matches!(f, Fault::OpenChannel)) {
            return Err(BrokerError::ChannelOpen("injected fault".into()));
        }

        let id = self.shared.next_channel.fetch_add(1, Ordering::SeqCst);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryChannel::new(id, Arc::clone(&self.shared))))
    }

    async fn close(&self, _timeout: Duration) -> BrokerResult<()> {
        self.shared.state.lock().shutdown();
        debug!("Memory broker closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{DEFAULT_EXCHANGE, Headers};
    use futures::StreamExt;
    use tokio::time::timeout;

    fn message(headers: Headers) -> OutboundMessage {
        OutboundMessage::new(headers, b"payload".to_vec())
    }

    #[tokio::test]
    async fn test_all_and_any_routing() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::shared("pdf")).await.unwrap();
        channel.declare_queue(&QueueSpec::shared("any")).await.unwrap();

        let all = HeaderPredicate::all([("format", "pdf"), ("type", "report")]).unwrap();
        let any = HeaderPredicate::any([("format", "pdf"), ("type", "report")]).unwrap();
        channel.bind_queue("pdf", DEFAULT_EXCHANGE, &all).await.unwrap();
        channel.bind_queue("any", DEFAULT_EXCHANGE, &any).await.unwrap();

        channel
            .publish(DEFAULT_EXCHANGE, &message(Headers::new().with("format", "pdf")))
            .await
            .unwrap();

        assert_eq!(broker.backlog_len("pdf"), 0);
        assert_eq!(broker.backlog_len("any"), 1);
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_receives_message_once_across_bindings() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::shared("q")).await.unwrap();
        for predicate in [
            HeaderPredicate::all([("a", "1")]).unwrap(),
            HeaderPredicate::all([("b", "2")]).unwrap(),
            HeaderPredicate::all([("a", "1")]).unwrap(),
        ] {
            channel.bind_queue("q", DEFAULT_EXCHANGE, &predicate).await.unwrap();
        }
        assert_eq!(broker.bindings("q").len(), 2);

        let headers = Headers::new().with("a", "1").with("b", "2");
        channel.publish(DEFAULT_EXCHANGE, &message(headers)).await.unwrap();
        assert_eq!(broker.backlog_len("q"), 1);
    }

    #[tokio::test]
    async fn test_consumers_compete_round_robin() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::shared("q")).await.unwrap();
        channel
            .bind_queue("q", DEFAULT_EXCHANGE, &HeaderPredicate::all([("k", "v")]).unwrap())
            .await
            .unwrap();

        let mut first = channel.consume("q").await.unwrap();
        let mut second = channel.consume("q").await.unwrap();
        for _ in 0..4 {
            channel
                .publish(DEFAULT_EXCHANGE, &message(Headers::new().with("k", "v")))
                .await
                .unwrap();
        }

        for stream in [&mut first, &mut second] {
            for _ in 0..2 {
                let delivery = timeout(Duration::from_secs(1), stream.next())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(delivery.body, b"payload");
            }
        }
    }

    #[tokio::test]
    async fn test_backlog_drains_into_first_consumer() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::shared("q")).await.unwrap();
        channel
            .bind_queue("q", DEFAULT_EXCHANGE, &HeaderPredicate::any([("k", 1i64)]).unwrap())
            .await
            .unwrap();
        channel
            .publish(DEFAULT_EXCHANGE, &message(Headers::new().with("k", 1i64)))
            .await
            .unwrap();

        let mut stream = channel.consume("q").await.unwrap();
        assert!(timeout(Duration::from_secs(1), stream.next()).await.unwrap().is_some());
        assert_eq!(broker.backlog_len("q"), 0);
    }

    #[tokio::test]
    async fn test_auto_delete_queue_goes_with_last_consumer() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::private("svc.H")).await.unwrap();
        channel
            .bind_queue("svc.H", DEFAULT_EXCHANGE, &HeaderPredicate::for_handler("svc", "H"))
            .await
            .unwrap();

        let first = channel.consume("svc.H").await.unwrap();
        let second = channel.consume("svc.H").await.unwrap();
        assert_eq!(broker.consumer_count("svc.H"), 2);

        drop(first);
        assert!(broker.queue_spec("svc.H").is_some());
        drop(second);
        assert!(broker.queue_spec("svc.H").is_none());
        assert!(broker.bindings("svc.H").is_empty());
    }

    #[tokio::test]
    async fn test_redeclare_with_different_flags_fails() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::shared("q")).await.unwrap();
        assert!(channel.declare_queue(&QueueSpec::shared("q")).await.is_ok());
        assert!(matches!(
            channel.declare_queue(&QueueSpec::private("q")).await,
            Err(BrokerError::PreconditionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_faults_fire_once() {
        let broker = MemoryBroker::new();
        broker.fail_next(Fault::OpenChannel);
        assert!(broker.open_channel().await.is_err());

        let channel = broker.open_channel().await.unwrap();
        broker.fail_next(Fault::Publish);
        let msg = message(Headers::new().with("k", "v"));
        assert!(channel.publish(DEFAULT_EXCHANGE, &msg).await.is_err());
        assert!(channel.publish(DEFAULT_EXCHANGE, &msg).await.is_ok());

        channel.close().await.unwrap();
        assert_eq!(broker.channels_opened(), 1);
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_rejects_channels() {
        let broker = MemoryBroker::new();
        let channel = broker.open_channel().await.unwrap();
        channel.declare_queue(&QueueSpec::shared("q")).await.unwrap();
        let mut stream = channel.consume("q").await.unwrap();

        broker.close(Duration::from_secs(1)).await.unwrap();
        assert!(timeout(Duration::from_secs(1), stream.next()).await.unwrap().is_none());
        assert!(broker.open_channel().await.is_err());
        assert!(broker.is_closed());
    }
}
