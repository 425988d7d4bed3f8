//! Message headers for the headers exchange.
//!
//! Routing in Courier is entirely header based: a message carries a
//! string-keyed attribute map and queues are bound with predicates over those
//! attributes. This module provides:
//!
//! - [`HeaderValue`] - A single attribute value (bool, integer, float or string)
//! - [`Headers`] - The ordered attribute map attached to every message
//! - [`keys`] - Header keys reserved for Courier's own routing and bookkeeping
//!
//! # Fill-if-absent
//!
//! System metadata is merged into caller-supplied headers with
//! [`Headers::put_if_absent`], which never overwrites a key the caller set:
//!
//! ```rust
//! use courier_core::{Headers, keys};
//!
//! let mut headers = Headers::new().with(keys::LOGGABLE, false);
//! assert!(!headers.put_if_absent(keys::LOGGABLE, true));
//! assert_eq!(headers.get_bool(keys::LOGGABLE), Some(false));
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Header keys reserved by Courier.
///
/// Application code must not repurpose these keys for unrelated meaning.
pub mod keys {
    /// Marks a message as eligible for central logging.
    pub const LOGGABLE: &str = "msrvLoggable";
    /// Name of the service that published the message.
    pub const PUBLISHED_BY: &str = "msrvPublishedBy";
    /// Target service of a handler binding.
    pub const SERVICE_NAME: &str = "serviceName";
    /// Target handler type of a handler binding.
    pub const HANDLER_TYPE: &str = "handlerType";
    /// Marks a message as an error event.
    pub const ERROR: &str = "error";
    /// Opaque error-kind tag of an error event.
    pub const ERROR_TYPE: &str = "errorType";
    /// Identifier of the originating request.
    pub const REQUEST_ID: &str = "requestId";
    /// Identifier of the service-level request.
    pub const SERVICE_REQUEST_ID: &str = "serviceRequestId";

    /// Value carried by [`ERROR`] on every error event.
    pub const ERROR_MARKER: &str = "error";

    /// All reserved keys.
    pub const RESERVED: [&str; 8] = [
        LOGGABLE,
        PUBLISHED_BY,
        SERVICE_NAME,
        HANDLER_TYPE,
        ERROR,
        ERROR_TYPE,
        REQUEST_ID,
        SERVICE_REQUEST_ID,
    ];
}

// ============================================================================
// HeaderValue
// ============================================================================

/// A single header attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
}

impl HeaderValue {
    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for HeaderValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

// ============================================================================
// Headers
// ============================================================================

/// The attribute map attached to a message.
///
/// Keys are kept sorted so that logging and comparisons are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, HeaderValue>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a header (builder pattern), replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a header, returning the previous value if any.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Inserts a header only if the key is not already present.
    ///
    /// Returns `true` if the value was inserted.
    pub fn put_if_absent(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> bool {
        match self.0.entry(key.into()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.0.remove(key)
    }

    /// Returns the value of a header.
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    /// Returns a header rendered as a string.
    ///
    /// String values are returned as-is; other values use their display form.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.0.get(key).map(ToString::to_string)
    }

    /// Returns a boolean header.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(HeaderValue::as_bool)
    }

    /// Returns whether the header is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over headers in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, HeaderValue> {
        self.0.iter()
    }

    /// Returns the header keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Consumes the headers and returns the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, HeaderValue> {
        self.0
    }

    /// Renders the headers as a JSON object for logging.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl From<BTreeMap<String, HeaderValue>> for Headers {
    fn from(map: BTreeMap<String, HeaderValue>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<HeaderValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a HeaderValue);
    type IntoIter = btree_map::Iter<'a, String, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Headers {
    type Item = (String, HeaderValue);
    type IntoIter = btree_map::IntoIter<String, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_if_absent_never_overwrites() {
        let mut headers = Headers::new().with(keys::PUBLISHED_BY, "caller");

        assert!(!headers.put_if_absent(keys::PUBLISHED_BY, "system"));
        assert!(headers.put_if_absent(keys::LOGGABLE, true));

        assert_eq!(
            headers.get(keys::PUBLISHED_BY),
            Some(&HeaderValue::from("caller"))
        );
        assert_eq!(headers.get_bool(keys::LOGGABLE), Some(true));
    }

    #[test]
    fn test_get_str_renders_non_string_values() {
        let headers = Headers::new()
            .with("flag", true)
            .with("count", 3)
            .with("name", "svc");

        assert_eq!(headers.get_str("flag").as_deref(), Some("true"));
        assert_eq!(headers.get_str("count").as_deref(), Some("3"));
        assert_eq!(headers.get_str("name").as_deref(), Some("svc"));
        assert_eq!(headers.get_str("missing"), None);
    }

    #[test]
    fn test_json_rendering_is_key_ordered() {
        let headers = Headers::new().with("b", 1).with("a", "x");
        assert_eq!(headers.to_json(), r#"{"a":"x","b":1}"#);
    }

    #[test]
    fn test_untagged_deserialization() {
        let headers: Headers =
            serde_json::from_str(r#"{"a":true,"b":7,"c":1.5,"d":"text"}"#).unwrap();

        assert_eq!(headers.get("a"), Some(&HeaderValue::Bool(true)));
        assert_eq!(headers.get("b"), Some(&HeaderValue::Int(7)));
        assert_eq!(headers.get("c"), Some(&HeaderValue::Float(1.5)));
        assert_eq!(headers.get("d"), Some(&HeaderValue::Str("text".into())));
    }
}
