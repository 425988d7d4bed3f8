//! Message types exchanged with the broker.

use std::fmt;

use super::headers::Headers;

/// A message about to be published to the exchange.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundMessage {
    /// Routing and bookkeeping attributes.
    pub headers: Headers,
    /// Opaque payload.
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Creates a new outbound message.
    pub fn new(headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A message delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Delivery {
    /// Headers the message was published with.
    pub headers: Headers,
    /// Opaque payload.
    pub body: Vec<u8>,
}

impl Delivery {
    /// Creates a new delivery.
    pub fn new(headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }
}

impl From<OutboundMessage> for Delivery {
    fn from(message: OutboundMessage) -> Self {
        Self {
            headers: message.headers,
            body: message.body,
        }
    }
}

// ============================================================================
// ErrorReport
// ============================================================================

/// An error event to be published on the exchange.
///
/// The error type is an opaque string tag used for routing; it is chosen by
/// the application and never interpreted by Courier. [`ErrorReport::of`]
/// derives the tag from the Rust type name when no explicit kind is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    error_type: String,
    message: String,
}

impl ErrorReport {
    /// Creates a report with an explicit error-kind tag.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Creates a report tagged with the error's type name.
    pub fn of<E: std::error::Error>(error: &E) -> Self {
        Self::new(std::any::type_name::<E>(), error.to_string())
    }

    /// Creates a report for an error with an explicit error-kind tag.
    pub fn tagged<E: fmt::Display + ?Sized>(error_type: impl Into<String>, error: &E) -> Self {
        Self::new(error_type, error.to_string())
    }

    /// Returns the error-kind tag.
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    /// Returns the human-readable message, published as the body.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TimeoutError;

    impl fmt::Display for TimeoutError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for TimeoutError {}

    #[test]
    fn test_report_of_uses_type_name() {
        let report = ErrorReport::of(&TimeoutError);
        assert!(report.error_type().ends_with("TimeoutError"));
        assert_eq!(report.message(), "boom");
    }

    #[test]
    fn test_tagged_report() {
        let report = ErrorReport::tagged("upstream.timeout", &TimeoutError);
        assert_eq!(report.error_type(), "upstream.timeout");
        assert_eq!(report.to_string(), "upstream.timeout: boom");
    }
}
