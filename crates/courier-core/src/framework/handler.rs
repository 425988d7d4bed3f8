//! Handler capability and handler descriptors.
//!
//! A [`Handler`] is application code invoked once per delivered message. A
//! [`HandlerDescriptor`] names a handler type and carries the factory used to
//! build a fresh instance for every consumer, so a handler never has to be
//! safe for concurrent use.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::{Handler, HandlerDescriptor, HandlerResult, HandlerSet, Headers};
//!
//! #[derive(Default)]
//! struct ThumbnailHandler {
//!     processed: usize,
//! }
//!
//! #[async_trait::async_trait]
//! impl Handler for ThumbnailHandler {
//!     async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult {
//!         // ...
//!         Ok(())
//!     }
//! }
//!
//! let handlers = HandlerSet::new().with(HandlerDescriptor::of::<ThumbnailHandler>());
//! ```
//!
//! A handler that publishes while handling a delivery takes the service's
//! client from its factory:
//!
//! ```rust,ignore
//! struct Relay {
//!     client: SharedClient,
//! }
//!
//! let relay = HandlerDescriptor::with_client("Relay", |client| Relay { client });
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::predicate::HeaderPredicate;
use crate::error::HandlerResult;
use crate::foundation::Headers;
use crate::integration::SharedClient;

// ============================================================================
// Handler Trait
// ============================================================================

/// Application capability invoked for every message delivered to its queue.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles one delivery.
    ///
    /// An error is logged by the consumer; the message is not redelivered.
    async fn handle(&self, headers: &Headers, body: &[u8]) -> HandlerResult;

    /// Additional bindings for this handler's queue.
    ///
    /// Each predicate is installed alongside the default
    /// `{serviceName, handlerType}` binding, never instead of it.
    fn bindings(&self, _service_name: &str) -> Vec<HeaderPredicate> {
        Vec::new()
    }
}

/// A type-erased handler instance owned by exactly one consumer.
pub type BoxedHandler = Box<dyn Handler>;

/// Factory producing independent handler instances.
///
/// Every instance receives the client of the service that runs it.
pub type HandlerFactory = Arc<dyn Fn(&SharedClient) -> BoxedHandler + Send + Sync>;

/// Returns the simple (unqualified, non-generic) name of a type.
pub fn simple_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ============================================================================
// HandlerDescriptor
// ============================================================================

/// Identifies a handler capability: a type name plus an instance factory.
#[derive(Clone)]
pub struct HandlerDescriptor {
    type_name: String,
    factory: HandlerFactory,
}

impl HandlerDescriptor {
    /// Creates a descriptor from a type name and a factory.
    pub fn new<F, H>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler,
    {
        Self {
            type_name: type_name.into(),
            factory: Arc::new(move |_: &SharedClient| Box::new(factory()) as BoxedHandler),
        }
    }

    /// Creates a descriptor whose factory receives the service's client.
    ///
    /// Handlers built this way can publish messages and error events while
    /// handling a delivery.
    pub fn with_client<F, H>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(SharedClient) -> H + Send + Sync + 'static,
        H: Handler,
    {
        Self {
            type_name: type_name.into(),
            factory: Arc::new(move |client: &SharedClient| {
                Box::new(factory(Arc::clone(client))) as BoxedHandler
            }),
        }
    }

    /// Creates a descriptor for a `Default`-constructible handler type.
    ///
    /// The type name is the handler's simple type name.
    pub fn of<H: Handler + Default>() -> Self {
        Self::new(simple_type_name::<H>(), H::default)
    }

    /// Returns the handler type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the queue name used for this handler within a service.
    pub fn queue_name(&self, service_name: &str) -> String {
        format!("{service_name}.{}", self.type_name)
    }

    /// Builds a new, independent handler instance bound to `client`.
    pub fn instantiate(&self, client: &SharedClient) -> BoxedHandler {
        (self.factory)(client)
    }

    /// Returns every binding of this handler's queue.
    ///
    /// The default `{serviceName, handlerType}` predicate comes first,
    /// followed by the handler's own predicates in order.
    pub fn bindings(&self, service_name: &str, client: &SharedClient) -> Vec<HeaderPredicate> {
        let mut bindings = vec![HeaderPredicate::for_handler(service_name, &self.type_name)];
        bindings.extend(self.instantiate(client).bindings(service_name));
        bindings
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("type_name", &self.type_name)
            .finish()
    }
}

// ============================================================================
// HandlerSet
// ============================================================================

/// An ordered set of handler descriptors, unique by type name.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: Vec<HandlerDescriptor>,
}

impl HandlerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Adds a descriptor (builder pattern).
    ///
    /// A descriptor whose type name is already present is ignored.
    pub fn with(mut self, descriptor: HandlerDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Adds a descriptor, returning `false` if the type name is already present.
    pub fn insert(&mut self, descriptor: HandlerDescriptor) -> bool {
        if self.contains(descriptor.type_name()) {
            return false;
        }
        self.handlers.push(descriptor);
        true
    }

    /// Returns whether a handler type is present.
    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.iter().any(|h| h.type_name() == type_name)
    }

    /// Returns a descriptor by type name.
    pub fn get(&self, type_name: &str) -> Option<&HandlerDescriptor> {
        self.handlers.iter().find(|h| h.type_name() == type_name)
    }

    /// Returns the number of handler types.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Iterates over descriptors in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, HandlerDescriptor> {
        self.handlers.iter()
    }

    /// Returns the handler type names in insertion order.
    pub fn type_names(&self) -> Vec<&str> {
        self.handlers.iter().map(HandlerDescriptor::type_name).collect()
    }
}

impl FromIterator<HandlerDescriptor> for HandlerSet {
    fn from_iter<I: IntoIterator<Item = HandlerDescriptor>>(iter: I) -> Self {
        let mut set = Self::new();
        for descriptor in iter {
            set.insert(descriptor);
        }
        set
    }
}

impl<'a> IntoIterator for &'a HandlerSet {
    type Item = &'a HandlerDescriptor;
    type IntoIter = std::slice::Iter<'a, HandlerDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.handlers.iter()
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}
