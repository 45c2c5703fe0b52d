//! # Core Type Definitions
//!
//! This module contains the value types shared by every layer:
//! - Error taxonomy (`HyperdbError`)
//! - Node designators (`Designator`)
//! - Date and interval values (`Date`, `Interval`)
//! - One-way hashed secrets (`Password`)

pub mod date;
pub mod password;

pub use date::{Date, DateTuple, Interval, IntervalTuple};
pub use password::Password;

use std::fmt;
use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the hyperdatabase.
///
/// Validation errors (`Type`, `Key`, `Value`, `Index`) are raised at the
/// call that caused them, never at commit time. `Io` and `Serialization`
/// come from the storage engines and are passed to the caller untouched.
#[derive(Debug, Error)]
pub enum HyperdbError {
    /// A supplied value's shape doesn't match its declared property type.
    #[error("Type error: {0}")]
    Type(String),

    /// Unknown property name, unknown class, or no key property defined.
    #[error("Key error: {0}")]
    Key(String),

    /// Invalid reference by value, duplicate key value, bad text input or
    /// ambiguous storage engine detection.
    #[error("Value error: {0}")]
    Value(String),

    /// Unknown node id, or out-of-range referenced id.
    #[error("Index error: {0}")]
    Index(String),

    /// Operation disallowed on a read-only handle, or a storage engine
    /// that can't be identified or isn't compiled in.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O error occurred in a storage engine.
    #[error("I/O error: {0}")]
    Io(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// DESIGNATOR
// =============================================================================

/// The external name of a node: classname followed by its numeric id,
/// e.g. `issue12`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Designator {
    /// Name of the node's class.
    pub classname: String,
    /// Numeric id within the class.
    pub nodeid: String,
}

impl Designator {
    /// Create a designator from its parts.
    #[must_use]
    pub fn new(classname: impl Into<String>, nodeid: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            nodeid: nodeid.into(),
        }
    }

    /// Split `issue12` into (`issue`, `12`).
    pub fn parse(text: &str) -> Result<Self, HyperdbError> {
        let text = text.trim();
        let split = text
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)
            .ok_or_else(|| HyperdbError::Value(format!("'{}' is not a node designator", text)))?;
        if split == 0 {
            return Err(HyperdbError::Value(format!(
                "'{}' is not a node designator",
                text
            )));
        }
        Ok(Self::new(&text[..split], &text[split..]))
    }
}

impl fmt::Display for Designator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.classname, self.nodeid)
    }
}

/// True if `nodeid` has the shape of a node id (all ASCII digits).
#[must_use]
pub fn is_numeric_id(nodeid: &str) -> bool {
    !nodeid.is_empty() && nodeid.bytes().all(|b| b.is_ascii_digit())
}

/// Sort node ids by numeric value, non-numeric ids last.
pub fn sort_ids(ids: &mut [String]) {
    ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
}

// =============================================================================
// TESTS
// =============================================================================
