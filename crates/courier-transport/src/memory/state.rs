//! Routing state of the in-memory broker.

use std::collections::{BTreeMap, VecDeque};

use futures::channel::mpsc::UnboundedSender;
use tracing::{debug, trace};

use courier_core::{BrokerError, BrokerResult, Delivery, HeaderPredicate, OutboundMessage, QueueSpec};

// ─── Queues ───────────────────────────────────────────────────────────────────

/// One attached consumer: a sender into its delivery stream.
pub(crate) struct ConsumerSlot {
    pub(crate) id: u64,
    pub(crate) sender: UnboundedSender<Delivery>,
}

/// A declared queue.
pub(crate) struct QueueState {
    pub(crate) spec: QueueSpec,
    pub(crate) consumers: Vec<ConsumerSlot>,
    /// Messages routed while no consumer was attached.
    pub(crate) backlog: VecDeque<Delivery>,
    /// Round-robin cursor into `consumers`.
    cursor: usize,
}

impl QueueState {
    fn new(spec: QueueSpec) -> Self {
        Self {
            spec,
            consumers: Vec::new(),
            backlog: VecDeque::new(),
            cursor: 0,
        }
    }

    /// Hands a delivery to the next live consumer, or buffers it.
    ///
    /// Returns `true` when the last consumer was found dead and removed.
    fn deliver(&mut self, delivery: Delivery) -> bool {
        let attached = !self.consumers.is_empty();
        let mut delivery = delivery;
        while !self.consumers.is_empty() {
            let index = self.cursor % self.consumers.len();
            match self.consumers[index].sender.unbounded_send(delivery) {
                Ok(()) => {
                    self.cursor = index + 1;
                    return false;
                }
                Err(e) => {
                    // Receiver dropped without deregistering; skip it.
                    delivery = e.into_inner();
                    self.consumers.remove(index);
                }
            }
        }
        self.backlog.push_back(delivery);
        attached
    }
}

/// A binding between a queue and an exchange.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub(crate) queue: String,
    pub(crate) exchange: String,
    pub(crate) predicate: HeaderPredicate,
}

// ─── Broker state ─────────────────────────────────────────────────────────────

/// Everything the broker knows, guarded by a single lock.
#[derive(Default)]
pub(crate) struct BrokerState {
    pub(crate) queues: BTreeMap<String, QueueState>,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) published: Vec<(String, OutboundMessage)>,
    pub(crate) closed: bool,
    next_consumer: u64,
}

impl BrokerState {
    pub(crate) fn declare(&mut self, spec: &QueueSpec) -> BrokerResult<String> {
        if let Some(existing) = self.queues.get(&spec.name) {
            if existing.spec != *spec {
                return Err(BrokerError::PreconditionFailed {
                    queue: spec.name.clone(),
                });
            }
            return Ok(spec.name.clone());
        }

        debug!(queue = %spec.name, exclusive = spec.exclusive, auto_delete = spec.auto_delete, "Queue declared");
        self.queues
            .insert(spec.name.clone(), QueueState::new(spec.clone()));
        Ok(spec.name.clone())
    }

    pub(crate) fn bind(
        &mut self,
        queue: &str,
        exchange: &str,
        predicate: &HeaderPredicate,
    ) -> BrokerResult<()> {
        if !self.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }

        let binding = Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            predicate: predicate.clone(),
        };
        if !self.bindings.contains(&binding) {
            debug!(queue = %queue, exchange = %exchange, predicate = %predicate, "Queue bound");
            self.bindings.push(binding);
        }
        Ok(())
    }

    /// Routes a message to every queue with at least one matching binding.
    ///
    /// Returns the number of queues the message reached.
    pub(crate) fn publish(&mut self, exchange: &str, message: &OutboundMessage) -> usize {
        self.published
            .push((exchange.to_string(), message.clone()));

        let mut targets: Vec<&str> = self
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange && b.predicate.matches(&message.headers))
            .map(|b| b.queue.as_str())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        let targets: Vec<String> = targets.into_iter().map(str::to_string).collect();

        for queue in &targets {
            let orphaned = self
                .queues
                .get_mut(queue)
                .is_some_and(|state| state.deliver(Delivery::from(message.clone())));
            if orphaned {
                self.remove_if_unused(queue);
            }
        }

        trace!(exchange = %exchange, queues = targets.len(), "Message routed");
        targets.len()
    }

    /// Attaches a consumer, draining any buffered messages into it.
    pub(crate) fn attach(
        &mut self,
        queue: &str,
        sender: UnboundedSender<Delivery>,
    ) -> BrokerResult<u64> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        self.next_consumer += 1;
        let id = self.next_consumer;
        while let Some(delivery) = state.backlog.pop_front() {
            if let Err(e) = sender.unbounded_send(delivery) {
                state.backlog.push_front(e.into_inner());
                break;
            }
        }
        state.consumers.push(ConsumerSlot { id, sender });
        Ok(id)
    }

    /// Detaches a consumer, deleting an auto-delete queue left without any.
    pub(crate) fn detach(&mut self, queue: &str, id: u64) {
        let Some(state) = self.queues.get_mut(queue) else {
            return;
        };

        state.consumers.retain(|c| c.id != id);
        self.remove_if_unused(queue);
    }

    /// Deletes `queue` if it is auto-delete and has no consumer left.
    fn remove_if_unused(&mut self, queue: &str) {
        let unused = self
            .queues
            .get(queue)
            .is_some_and(|state| state.spec.auto_delete && state.consumers.is_empty());
        if unused {
            debug!(queue = %queue, "Auto-delete queue removed");
            self.queues.remove(queue);
            self.bindings.retain(|b| b.queue != queue);
        }
    }

    /// Drops every consumer, ending all delivery streams.
    pub(crate) fn shutdown(&mut self) {
        self.closed = true;
        for state in self.queues.values_mut() {
            state.consumers.clear();
        }
    }
}
