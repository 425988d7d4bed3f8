//! Framework layer - Routing and handling.
//!
//! This module contains the pieces that decide where messages go and who
//! handles them:
//! - Header predicates (binding clauses) and their builders
//! - The handler capability, descriptors and handler sets
//! - Error subscriptions and the error-handler adapter

pub mod error_handler;
pub mod handler;
pub mod predicate;

pub use error_handler::{ErrorHandler, ErrorHandlerAdapter, ErrorSubscription};
pub use handler::{
    BoxedHandler, Handler, HandlerDescriptor, HandlerFactory, HandlerSet, simple_type_name,
};
pub use predicate::{HeaderPredicate, MATCH_ARGUMENT, MatchMode, PredicateBuilder};
