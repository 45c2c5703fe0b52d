//! # Record Encoding
//!
//! Every value stored in a node or journal store is one version byte
//! followed by a postcard payload.
//!
//! Each property kind has its own tagged `RawValue` variant, so a stored
//! record never depends on the schema to be decoded. Dates and intervals
//! are fixed-width tuples; passwords are the scheme tag plus digest.

use crate::journal::JournalAction;
use crate::primitives::RECORD_VERSION;
use crate::property::Value;
use crate::types::{Date, DateTuple, HyperdbError, Interval, IntervalTuple, Password};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;

// =============================================================================
// RAW VALUES
// =============================================================================

/// The serialized form of one property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTuple),
    Interval(IntervalTuple),
    Password { scheme: String, digest: String },
    Link(String),
    Multilink(Vec<String>),
}

impl From<&Value> for RawValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::String(s.clone()),
            Value::Number(n) => Self::Number(*n),
            Value::Boolean(b) => Self::Boolean(*b),
            Value::Date(d) => Self::Date(d.to_tuple()),
            Value::Interval(i) => Self::Interval(i.to_tuple()),
            Value::Password(p) => Self::Password {
                scheme: p.scheme().to_string(),
                digest: p.digest().to_string(),
            },
            Value::Link(id) => Self::Link(id.clone()),
            Value::Multilink(ids) => Self::Multilink(ids.clone()),
        }
    }
}

impl RawValue {
    /// Rebuild the typed value.
    pub fn to_value(&self) -> Result<Value, HyperdbError> {
        Ok(match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(*n),
            Self::Boolean(b) => Value::Boolean(*b),
            Self::Date(t) => Value::Date(Date::from_tuple(*t)?),
            Self::Interval(t) => Value::Interval(Interval::from_tuple(*t)),
            Self::Password { scheme, digest } => {
                Value::Password(Password::from_parts(scheme, digest)?)
            }
            Self::Link(id) => Value::Link(id.clone()),
            Self::Multilink(ids) => Value::Multilink(ids.clone()),
        })
    }
}

// =============================================================================
// NODE RECORDS
// =============================================================================

/// A stored node. Properties absent from `values` are null (or the
/// property's default, for properties added after the node was written).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub retired: bool,
    pub values: BTreeMap<String, RawValue>,
}

impl NodeRecord {
    /// Set `name` to `value`, removing it when null.
    pub fn put(&mut self, name: &str, value: Option<&Value>) {
        match value {
            Some(v) => {
                self.values.insert(name.to_string(), RawValue::from(v));
            }
            None => {
                self.values.remove(name);
            }
        }
    }

    /// Typed value of `name`, or `None` when unset.
    pub fn value(&self, name: &str) -> Result<Option<Value>, HyperdbError> {
        self.values.get(name).map(RawValue::to_value).transpose()
    }
}

// =============================================================================
// JOURNAL RECORDS
// =============================================================================

/// Parameters of a stored journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredParams {
    /// Property snapshot (create) or old values of changed properties (set).
    Properties(BTreeMap<String, Option<RawValue>>),
    /// The node on the other end of a link/unlink and its property.
    Link {
        classname: String,
        nodeid: String,
        property: String,
    },
    None,
}

/// One stored journal entry; a node's journal is a list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredJournalEntry {
    pub nodeid: String,
    pub stamp: DateTuple,
    pub tag: String,
    pub action: JournalAction,
    pub params: StoredParams,
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode a record as version byte + postcard payload.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, HyperdbError> {
    let payload =
        postcard::to_stdvec(record).map_err(|e| HyperdbError::Serialization(e.to_string()))?;
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(RECORD_VERSION);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a record written by `encode_record`.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HyperdbError> {
    let (version, payload) = bytes
        .split_first()
        .ok_or_else(|| HyperdbError::Serialization("empty record".to_string()))?;
    if *version != RECORD_VERSION {
        return Err(HyperdbError::Serialization(format!(
            "Unsupported record version: {} (expected {})",
            version, RECORD_VERSION
        )));
    }
    postcard::from_bytes(payload)
        .map_err(|e| HyperdbError::Serialization(format!("Failed to decode record: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
