//! Job record encoding.
//!
//! Jobs travel to Redis as a flat `key, value, key, value, ...` argument list
//! (the shape `HSET` and the queue scripts take) and come back from `HGETALL`
//! as a map of strings whose structured fields hold JSON text.
//!
//! ```
//! use bullq_queue::codec::{object_to_flat_array, parse_json_string_values, FieldRecord};
//! use serde_json::json;
//!
//! let mut record = FieldRecord::new();
//! record.insert("name".into(), json!("send_email"));
//! record.insert("attempts".into(), json!(3));
//! assert_eq!(
//!     object_to_flat_array(&record),
//!     vec![json!("name"), json!("send_email"), json!("attempts"), json!(3)],
//! );
//!
//! let decoded = parse_json_string_values([("opts", r#"{"a":1}"#)]).unwrap();
//! assert_eq!(decoded["opts"], json!({"a": 1}));
//! ```

use crate::error::{QueueError, QueueResult};
use redis::{RedisWrite, ToRedisArgs};

/// A single job field value.
pub type FieldValue = serde_json::Value;

/// Job fields in insertion order.
pub type FieldRecord = serde_json::Map<String, FieldValue>;

/// Interleave a record's keys and values, in the record's own order.
///
/// Values are passed through as they are; turning them into wire bytes is
/// the job of [`RedisArgs`].
pub fn object_to_flat_array(record: &FieldRecord) -> Vec<FieldValue> {
    let mut flat = Vec::with_capacity(record.len() * 2);
    for (key, value) in record {
        flat.push(FieldValue::String(key.clone()));
        flat.push(value.clone());
    }
    flat
}

/// Parse every value of a string map as JSON, keeping the keys.
///
/// Fails on the first value that is not JSON, naming its key. Nothing is
/// returned for the other keys in that case.
pub fn parse_json_string_values<I, K, V>(input: I) -> QueueResult<FieldRecord>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<str>,
{
    input
        .into_iter()
        .map(|(key, value)| {
            let key = key.into();
            match serde_json::from_str::<FieldValue>(value.as_ref()) {
                Ok(parsed) => Ok((key, parsed)),
                Err(source) => Err(QueueError::Decode { key, source }),
            }
        })
        .collect()
}

/// Encode each value of a record as JSON text, the inverse of
/// [`parse_json_string_values`].
pub fn encode_json_values(record: &FieldRecord) -> QueueResult<Vec<(String, String)>> {
    record
        .iter()
        .map(|(key, value)| {
            serde_json::to_string(value)
                .map(|text| (key.clone(), text))
                .map_err(|e| QueueError::Serialization(format!("field '{}': {}", key, e)))
        })
        .collect()
}

/// A flat argument list ready to be appended to a Redis command.
///
/// Strings are written as is, numbers as decimal text, booleans as `1`/`0`,
/// null as an empty string, arrays and objects as JSON text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedisArgs(pub Vec<FieldValue>);

impl RedisArgs {
    /// Flatten a record into command arguments.
    pub fn from_record(record: &FieldRecord) -> Self {
        Self(object_to_flat_array(record))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn write_value<W>(value: &FieldValue, out: &mut W)
where
    W: ?Sized + RedisWrite,
{
    match value {
        FieldValue::Null => out.write_arg(b""),
        FieldValue::Bool(b) => out.write_arg(if *b { b"1" } else { b"0" }),
        FieldValue::Number(n) => out.write_arg(n.to_string().as_bytes()),
        FieldValue::String(s) => out.write_arg(s.as_bytes()),
        nested => out.write_arg(nested.to_string().as_bytes()),
    }
}

impl ToRedisArgs for RedisArgs {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        for value in &self.0 {
            write_value(value, out);
        }
    }
}
