//! Header predicates: the binding clauses of the headers exchange.
//!
//! A [`HeaderPredicate`] is one binding between a queue and the exchange. A
//! message is routed to the queue when its headers satisfy the predicate:
//!
//! - [`MatchMode::All`] - every attribute is present with an equal value
//! - [`MatchMode::Any`] - at least one attribute is present with an equal value
//!
//! A queue may carry several predicates; it is reachable when any of them
//! matches, and still receives each message once.
//!
//! # Example
//!
//! ```rust
//! use courier_core::{HeaderPredicate, Headers, MatchMode};
//!
//! let predicate = HeaderPredicate::builder()
//!     .attribute("format", "pdf")
//!     .attribute("type", "report")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(predicate.match_mode(), MatchMode::All);
//! assert!(predicate.matches(&Headers::new().with("format", "pdf").with("type", "report")));
//! assert!(!predicate.matches(&Headers::new().with("format", "pdf")));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PredicateError;
use crate::foundation::{HeaderValue, Headers, keys};

/// Binding argument that carries the match mode on the broker.
pub const MATCH_ARGUMENT: &str = "x-match";

// ============================================================================
// MatchMode
// ============================================================================

/// How the attributes of a predicate are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every attribute must match.
    #[default]
    All,
    /// At least one attribute must match.
    Any,
}

impl MatchMode {
    /// Returns the wire value of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

impl FromStr for MatchMode {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            other => Err(PredicateError::UnknownMatchMode(other.to_string())),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HeaderPredicate
// ============================================================================

/// One binding clause: a match mode plus a non-empty attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderPredicate {
    match_mode: MatchMode,
    attributes: BTreeMap<String, HeaderValue>,
}

impl HeaderPredicate {
    /// Creates a predicate, rejecting an empty attribute set.
    pub fn new<I, K, V>(match_mode: MatchMode, attributes: I) -> Result<Self, PredicateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        let attributes: BTreeMap<String, HeaderValue> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        if attributes.is_empty() {
            return Err(PredicateError::Empty);
        }

        Ok(Self {
            match_mode,
            attributes,
        })
    }

    /// Creates a predicate requiring every attribute to match.
    pub fn all<I, K, V>(attributes: I) -> Result<Self, PredicateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        Self::new(MatchMode::All, attributes)
    }

    /// Creates a predicate requiring at least one attribute to match.
    pub fn any<I, K, V>(attributes: I) -> Result<Self, PredicateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        Self::new(MatchMode::Any, attributes)
    }

    /// Starts building a predicate (match mode defaults to `all`).
    pub fn builder() -> PredicateBuilder {
        PredicateBuilder::default()
    }

    /// The default binding of a handler queue.
    ///
    /// Matches messages addressed to `handler_type` within `service_name`.
    pub fn for_handler(service_name: &str, handler_type: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(keys::SERVICE_NAME.to_string(), HeaderValue::from(service_name));
        attributes.insert(keys::HANDLER_TYPE.to_string(), HeaderValue::from(handler_type));
        Self::from_nonempty(MatchMode::All, attributes)
    }

    /// Builds a predicate from attributes the caller knows are non-empty.
    pub(crate) fn from_nonempty(
        match_mode: MatchMode,
        attributes: BTreeMap<String, HeaderValue>,
    ) -> Self {
        debug_assert!(!attributes.is_empty());
        Self {
            match_mode,
            attributes,
        }
    }

    /// Returns the match mode.
    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// Returns the attributes.
    pub fn attributes(&self) -> &BTreeMap<String, HeaderValue> {
        &self.attributes
    }

    /// Returns the value of one attribute.
    pub fn attribute(&self, key: &str) -> Option<&HeaderValue> {
        self.attributes.get(key)
    }

    /// Evaluates the predicate against message headers.
    ///
    /// Attributes whose key starts with `x-` are broker arguments and are
    /// ignored, as a headers exchange does.
    pub fn matches(&self, headers: &Headers) -> bool {
        let mut relevant = self
            .attributes
            .iter()
            .filter(|(key, _)| !key.starts_with("x-"))
            .peekable();

        if relevant.peek().is_none() {
            return false;
        }

        let hit = |(key, value): (&String, &HeaderValue)| headers.get(key) == Some(value);
        match self.match_mode {
            MatchMode::All => relevant.all(hit),
            MatchMode::Any => relevant.any(hit),
        }
    }

    /// Renders the predicate as broker binding arguments, `x-match` included.
    pub fn to_arguments(&self) -> Headers {
        let mut arguments: Headers = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        arguments.insert(MATCH_ARGUMENT, self.match_mode.as_str());
        arguments
    }

    /// Parses broker binding arguments back into a predicate.
    ///
    /// A missing `x-match` defaults to `all`.
    pub fn from_arguments(arguments: &Headers) -> Result<Self, PredicateError> {
        let match_mode = match arguments.get(MATCH_ARGUMENT) {
            Some(HeaderValue::Str(mode)) => mode.parse()?,
            Some(other) => return Err(PredicateError::UnknownMatchMode(other.to_string())),
            None => MatchMode::All,
        };

        Self::new(
            match_mode,
            arguments
                .iter()
                .filter(|(key, _)| key.as_str() != MATCH_ARGUMENT)
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }
}

impl fmt::Display for HeaderPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.match_mode)?;
        for (i, (key, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

// ============================================================================
// PredicateBuilder
// ============================================================================

/// Builder for [`HeaderPredicate`].
#[derive(Debug, Clone, Default)]
pub struct PredicateBuilder {
    match_mode: MatchMode,
    attributes: BTreeMap<String, HeaderValue>,
}

impl PredicateBuilder {
    /// Sets the match mode.
    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Requires at least one attribute to match.
    pub fn any(self) -> Self {
        self.match_mode(MatchMode::Any)
    }

    /// Adds an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds an attribute only when a value is present.
    pub fn attribute_opt<V: Into<HeaderValue>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.attribute(key, value),
            None => self,
        }
    }

    /// Builds the predicate.
    pub fn build(self) -> Result<HeaderPredicate, PredicateError> {
        HeaderPredicate::new(self.match_mode, self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_predicate_is_rejected() {
        let result = HeaderPredicate::all(Vec::<(String, HeaderValue)>::new());
        assert_eq!(result, Err(PredicateError::Empty));
        assert_eq!(HeaderPredicate::builder().build(), Err(PredicateError::Empty));
    }

    #[test]
    fn test_handler_binding() {
        let predicate = HeaderPredicate::for_handler("billing", "InvoiceHandler");

        assert_eq!(predicate.match_mode(), MatchMode::All);
        assert_eq!(predicate.attributes().len(), 2);
        assert_eq!(
            predicate.attribute(keys::SERVICE_NAME),
            Some(&HeaderValue::from("billing"))
        );
        assert_eq!(
            predicate.attribute(keys::HANDLER_TYPE),
            Some(&HeaderValue::from("InvoiceHandler"))
        );
    }

    #[test]
    fn test_all_requires_every_attribute() {
        let predicate = HeaderPredicate::all([("a", "1"), ("b", "2")]).unwrap();

        assert!(predicate.matches(&Headers::new().with("a", "1").with("b", "2").with("c", 3)));
        assert!(!predicate.matches(&Headers::new().with("a", "1")));
        assert!(!predicate.matches(&Headers::new().with("a", "1").with("b", "3")));
    }

    #[test]
    fn test_any_requires_one_attribute() {
        let predicate = HeaderPredicate::any([("a", "1"), ("b", "2")]).unwrap();

        assert!(predicate.matches(&Headers::new().with("b", "2")));
        assert!(!predicate.matches(&Headers::new().with("b", "1")));
        assert!(!predicate.matches(&Headers::new()));
    }

    #[test]
    fn test_values_compare_by_type() {
        let predicate = HeaderPredicate::all([("flag", true)]).unwrap();
        assert!(predicate.matches(&Headers::new().with("flag", true)));
        assert!(!predicate.matches(&Headers::new().with("flag", "true")));
    }

    #[test]
    fn test_broker_arguments() {
        let predicate = HeaderPredicate::builder()
            .any()
            .attribute("a", "1")
            .build()
            .unwrap();

        let arguments = predicate.to_arguments();
        assert_eq!(arguments.get_str(MATCH_ARGUMENT).as_deref(), Some("any"));
        assert_eq!(HeaderPredicate::from_arguments(&arguments), Ok(predicate));

        let implicit = Headers::new().with("a", "1");
        assert_eq!(
            HeaderPredicate::from_arguments(&implicit).map(|p| p.match_mode()),
            Ok(MatchMode::All)
        );

        let bogus = Headers::new().with(MATCH_ARGUMENT, "some").with("a", "1");
        assert!(matches!(
            HeaderPredicate::from_arguments(&bogus),
            Err(PredicateError::UnknownMatchMode(_))
        ));
    }

    #[test]
    fn test_attribute_opt_skips_absent_values() {
        let predicate = HeaderPredicate::builder()
            .attribute("error", "error")
            .attribute_opt("requestId", Some("req-1"))
            .attribute_opt::<&str>("serviceRequestId", None)
            .build()
            .unwrap();

        assert_eq!(predicate.attributes().len(), 2);
        assert_eq!(predicate.to_string(), "all{error=error, requestId=req-1}");
    }
}
