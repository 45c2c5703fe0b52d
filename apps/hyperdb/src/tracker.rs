//! # Tracker File
//!
//! The `tracker.toml` the binary starts from: where the database lives,
//! which engine new stores use, and the class schema.
//!
//! ```toml
//! [database]
//! dir = "db"
//! engine = "redb"
//!
//! [[class]]
//! name = "status"
//! key = "name"
//! [class.properties]
//! name = "string"
//! ```
//!
//! A relative `dir` is resolved against the tracker file's directory.

use hyperdb_core::{ClassSpec, EngineKind, HyperdbError, Schema};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum tracker file size (1 MB).
const MAX_TRACKER_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
struct TrackerFile {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(rename = "class", default)]
    classes: Vec<ClassSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    dir: Option<PathBuf>,
    engine: Option<String>,
}

/// A loaded tracker definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracker {
    /// Database directory, if the tracker names one.
    pub dir: Option<PathBuf>,
    /// Engine for new stores; `None` means the best available.
    pub engine: Option<EngineKind>,
    pub schema: Schema,
}

impl Tracker {
    /// Parse tracker TOML. Relative directories resolve against `base`.
    pub fn from_toml_str(text: &str, base: &Path) -> Result<Self, HyperdbError> {
        let file: TrackerFile = toml::from_str(text)
            .map_err(|e| HyperdbError::Value(format!("tracker file: {}", e)))?;
        let engine = match file.database.engine.as_deref().map(str::trim) {
            None | Some("") | Some("auto") => None,
            Some(name) => Some(name.parse()?),
        };
        let dir = file
            .database
            .dir
            .map(|dir| if dir.is_relative() { base.join(dir) } else { dir });
        let schema = Schema {
            classes: file.classes,
        };
        schema.class_defs()?;
        Ok(Self {
            dir,
            engine,
            schema,
        })
    }

    /// Read and parse the tracker file at `path`.
    pub fn load(path: &Path) -> Result<Self, HyperdbError> {
        let metadata = fs::metadata(path).map_err(|e| {
            HyperdbError::Io(format!("cannot read tracker file {}: {}", path.display(), e))
        })?;
        if metadata.len() > MAX_TRACKER_FILE_SIZE {
            return Err(HyperdbError::Value(format!(
                "tracker file {} is {} bytes, more than the {} allowed",
                path.display(),
                metadata.len(),
                MAX_TRACKER_FILE_SIZE
            )));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            HyperdbError::Io(format!("cannot read tracker file {}: {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text, base)
    }
}
