//! # Property Type System
//!
//! `PropertyType` describes what a class property holds; `Value` is a typed
//! value of one of those kinds. The shape check (`PropertyType::accepts`)
//! and text coercion (`PropertyType::parse_text`) live here. Referential
//! checks for links need the database and live in the class layer.

use crate::types::{Date, HyperdbError, Interval, Password};
use std::fmt;

// =============================================================================
// PROPERTY TYPES
// =============================================================================

/// The kind of a class property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Interval,
    Password,
    /// A reference to one node of `class`.
    Link {
        class: String,
        /// Record link/unlink entries on the target node's journal.
        journal: bool,
    },
    /// A set of references to nodes of `class`.
    Multilink { class: String, journal: bool },
}

impl PropertyType {
    /// A journaled Link to `class`.
    #[must_use]
    pub fn link(class: impl Into<String>) -> Self {
        Self::Link {
            class: class.into(),
            journal: true,
        }
    }

    /// A journaled Multilink to `class`.
    #[must_use]
    pub fn multilink(class: impl Into<String>) -> Self {
        Self::Multilink {
            class: class.into(),
            journal: true,
        }
    }

    /// Lower-case kind name, as used in schema files.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Interval => "interval",
            Self::Password => "password",
            Self::Link { .. } => "link",
            Self::Multilink { .. } => "multilink",
        }
    }

    /// Target class of a Link or Multilink.
    #[must_use]
    pub fn target_class(&self) -> Option<&str> {
        match self {
            Self::Link { class, .. } | Self::Multilink { class, .. } => Some(class),
            _ => None,
        }
    }

    /// True if link changes on this property are journaled on the target.
    #[must_use]
    pub fn journals_links(&self) -> bool {
        match self {
            Self::Link { journal, .. } | Self::Multilink { journal, .. } => *journal,
            _ => false,
        }
    }

    /// Value of an unset property: empty for Multilink, null otherwise.
    #[must_use]
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::Multilink { .. } => Some(Value::Multilink(Vec::new())),
            _ => None,
        }
    }

    /// True if `value` has the shape this kind stores.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_))
                | (Self::Number, Value::Number(_))
                | (Self::Boolean, Value::Boolean(_))
                | (Self::Date, Value::Date(_))
                | (Self::Interval, Value::Interval(_))
                | (Self::Password, Value::Password(_))
                | (Self::Link { .. }, Value::Link(_))
                | (Self::Multilink { .. }, Value::Multilink(_))
        )
    }

    /// Coerce front-end text into a value of this kind.
    ///
    /// Blank text is null (empty for Multilink). Link and Multilink
    /// references come back unresolved: they may still be key values.
    pub fn parse_text(&self, text: &str) -> Result<Option<Value>, HyperdbError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(self.default_value());
        }
        let value = match self {
            Self::String => Value::String(text.to_string()),
            Self::Number => {
                let n: f64 = text
                    .parse()
                    .map_err(|_| HyperdbError::Value(format!("'{}' is not a number", text)))?;
                if !n.is_finite() {
                    return Err(HyperdbError::Value(format!("'{}' is not a number", text)));
                }
                Value::Number(n)
            }
            Self::Boolean => match text.to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Value::Boolean(true),
                "no" | "false" | "off" | "0" => Value::Boolean(false),
                _ => {
                    return Err(HyperdbError::Value(format!(
                        "'{}' is not a boolean (expected yes or no)",
                        text
                    )));
                }
            },
            Self::Date => Value::Date(Date::parse(text)?),
            Self::Interval => Value::Interval(Interval::parse(text)?),
            Self::Password => Value::Password(Password::new(text)),
            Self::Link { .. } => Value::Link(text.to_string()),
            Self::Multilink { .. } => Value::Multilink(
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        };
        Ok(Some(value))
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_class() {
            Some(class) => write!(f, "{}:{}", self.name(), class),
            None => write!(f, "{}", self.name()),
        }
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(Date),
    Interval(Interval),
    Password(Password),
    /// Id of the target node (or, on input only, its key value).
    Link(String),
    /// Ids of the target nodes.
    Multilink(Vec<String>),
}

impl Value {
    /// A Link value.
    #[must_use]
    pub fn link(id: impl Into<String>) -> Self {
        Self::Link(id.into())
    }

    /// A Multilink value.
    pub fn multilink<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multilink(ids.into_iter().map(Into::into).collect())
    }

    /// Lower-case kind name of this value's shape.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::Interval(_) => "interval",
            Self::Password(_) => "password",
            Self::Link(_) => "link",
            Self::Multilink(_) => "multilink",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Link(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Self::Date(d)
    }
}

impl From<Interval> for Value {
    fn from(i: Interval) -> Self {
        Self::Interval(i)
    }
}

impl From<Password> for Value {
    fn from(p: Password) -> Self {
        Self::Password(p)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Link(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            Self::Date(d) => write!(f, "{}", d),
            Self::Interval(i) => write!(f, "{}", i),
            Self::Password(p) => write!(f, "{}", p),
            Self::Multilink(ids) => write!(f, "{}", ids.join(",")),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
