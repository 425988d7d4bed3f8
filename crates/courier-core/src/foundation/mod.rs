//! Foundation layer - Core data types.
//!
//! This module contains the building blocks every other layer uses:
//! - Header attribute maps and the reserved header keys
//! - Outbound messages, deliveries and error reports

pub mod headers;
pub mod message;

pub use headers::{HeaderValue, Headers, keys};
pub use message::{Delivery, ErrorReport, OutboundMessage};
