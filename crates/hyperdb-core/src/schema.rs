//! # Schema Configuration
//!
//! Class definitions read from a static TOML document.
//!
//! ```toml
//! [[class]]
//! name = "status"
//! key = "name"
//! [class.properties]
//! name = "string"
//! order = "number"
//!
//! [[class]]
//! name = "issue"
//! [class.properties]
//! title = "string"
//! status = "link:status"
//! nosy = { type = "multilink", class = "user", journal = false }
//! ```

use crate::class::{ClassDef, ClassKind};
use crate::database::Database;
use crate::property::PropertyType;
use crate::types::HyperdbError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed schema document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "class", default)]
    pub classes: Vec<ClassSpec>,
}

/// One `[[class]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySpec>,
}

/// A property declaration: either a type name (`"string"`,
/// `"link:status"`) or a table with `type`, `class` and `journal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertySpec {
    Short(String),
    Full {
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        class: Option<String>,
        #[serde(default = "journal_default")]
        journal: bool,
    },
}

fn journal_default() -> bool {
    true
}

impl PropertySpec {
    /// The property type this declaration names.
    pub fn to_type(&self) -> Result<PropertyType, HyperdbError> {
        let (name, class, journal) = match self {
            Self::Short(text) => match text.split_once(':') {
                Some((name, class)) => (name.trim(), Some(class.trim()), true),
                None => (text.trim(), None, true),
            },
            Self::Full { ty, class, journal } => (ty.trim(), class.as_deref(), *journal),
        };
        let class = class.filter(|c| !c.is_empty());
        let needs_class = |class: Option<&str>| {
            class.map(str::to_string).ok_or_else(|| {
                HyperdbError::Value(format!("{} property needs a target class", name))
            })
        };
        Ok(match name {
            "string" => PropertyType::String,
            "number" => PropertyType::Number,
            "boolean" => PropertyType::Boolean,
            "date" => PropertyType::Date,
            "interval" => PropertyType::Interval,
            "password" => PropertyType::Password,
            "link" => PropertyType::Link {
                class: needs_class(class)?,
                journal,
            },
            "multilink" => PropertyType::Multilink {
                class: needs_class(class)?,
                journal,
            },
            other => {
                return Err(HyperdbError::Value(format!(
                    "unknown property type '{}'",
                    other
                )));
            }
        })
    }
}

impl ClassSpec {
    /// The `ClassDef` this table declares.
    pub fn to_def(&self) -> Result<ClassDef, HyperdbError> {
        let mut def = match self.kind {
            ClassKind::Plain => ClassDef::new(&self.name),
            ClassKind::File => ClassDef::file(&self.name),
        };
        for (name, spec) in &self.properties {
            let ty = spec.to_type().map_err(|e| match e {
                HyperdbError::Value(msg) => {
                    HyperdbError::Value(format!("{}.{}: {}", self.name, name, msg))
                }
                other => other,
            })?;
            def = def.with_property(name, ty);
        }
        if let Some(key) = &self.key {
            def = def.with_key(key);
        }
        Ok(def)
    }
}

impl Schema {
    /// Parse a TOML schema document.
    pub fn from_toml_str(text: &str) -> Result<Self, HyperdbError> {
        let schema: Self =
            toml::from_str(text).map_err(|e| HyperdbError::Value(format!("schema: {}", e)))?;
        schema.class_defs()?;
        Ok(schema)
    }

    /// Every declared class as a `ClassDef`, in document order.
    pub fn class_defs(&self) -> Result<Vec<ClassDef>, HyperdbError> {
        self.classes.iter().map(ClassSpec::to_def).collect()
    }

    /// Register every class on `db`.
    pub fn apply(&self, db: &mut Database) -> Result<(), HyperdbError> {
        for def in self.class_defs()? {
            db.addclass(def)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
