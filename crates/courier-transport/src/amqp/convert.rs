//! Conversion between Courier headers and AMQP field tables.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use tracing::trace;

use courier_core::{HeaderValue, Headers};

/// Encodes headers as an AMQP field table.
pub(crate) fn to_field_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(ShortString::from(key.clone()), to_amqp_value(value));
    }
    table
}

/// Decodes an AMQP field table; values without a header equivalent are skipped.
pub(crate) fn from_field_table(table: &FieldTable) -> Headers {
    let mut headers = Headers::new();
    for (key, value) in table.inner() {
        match from_amqp_value(value) {
            Some(value) => {
                headers.insert(key.as_str(), value);
            }
            None => trace!(key = %key.as_str(), "Skipping unsupported header value"),
        }
    }
    headers
}

fn to_amqp_value(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
        HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
        HeaderValue::Float(f) => AMQPValue::Double(*f),
        HeaderValue::Str(s) => AMQPValue::LongString(LongString::from(s.as_str())),
    }
}

fn from_amqp_value(value: &AMQPValue) -> Option<HeaderValue> {
    let value = match value {
        AMQPValue::Boolean(b) => HeaderValue::Bool(*b),
        AMQPValue::ShortShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongLongInt(i) => HeaderValue::Int(*i),
        AMQPValue::Float(f) => HeaderValue::Float(f64::from(*f)),
        AMQPValue::Double(f) => HeaderValue::Float(*f),
        AMQPValue::ShortString(s) => HeaderValue::Str(s.as_str().to_string()),
        AMQPValue::LongString(s) => {
            HeaderValue::Str(String::from_utf8_lossy(s.as_bytes()).into_owned())
        }
        _ => return None,
    };
    Some(value)
}
