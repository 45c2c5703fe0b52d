//! # Database Configuration
//!
//! Everything needed to open a database handle: the directory, the journal
//! tag (absent means read-only), the engine for new stores and the debug
//! tracing switch. Environment overrides are applied by `from_env`.

use crate::primitives::{DEBUG_ENV, ENGINE_ENV};
use crate::storage::EngineKind;
use crate::types::HyperdbError;
use std::path::PathBuf;

/// Options for `Database::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database directory.
    pub dir: PathBuf,
    /// Actor identity written into journal entries and `creator`/`actor`.
    /// `None` opens the database read-only.
    pub journal_tag: Option<String>,
    /// Engine for new stores. `None` picks the best compiled-in engine.
    pub engine: Option<EngineKind>,
    /// Log every operation at `debug` rather than `trace`.
    pub debug: bool,
}

impl Config {
    /// A read-only configuration for `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            journal_tag: None,
            engine: None,
            debug: false,
        }
    }

    /// Open writable, journaling as `tag`.
    #[must_use]
    pub fn with_journal_tag(mut self, tag: impl Into<String>) -> Self {
        self.journal_tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Overlay `HYPERDBDEBUG` and `HYPERDB_ENGINE` from the environment.
    pub fn from_env(self) -> Result<Self, HyperdbError> {
        self.overlay(
            std::env::var(DEBUG_ENV).ok().as_deref(),
            std::env::var(ENGINE_ENV).ok().as_deref(),
        )
    }

    fn overlay(mut self, debug: Option<&str>, engine: Option<&str>) -> Result<Self, HyperdbError> {
        if let Some(flag) = debug {
            self.debug = !flag.trim().is_empty();
        }
        match engine.map(str::trim) {
            None | Some("") | Some("auto") => {}
            Some(name) => self.engine = Some(name.parse()?),
        }
        Ok(self)
    }

    /// True when no journal tag is set.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.journal_tag.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = Config::new("/tmp/db")
            .with_journal_tag("admin")
            .with_engine(EngineKind::Flat)
            .with_debug(true);
        assert_eq!(config.journal_tag.as_deref(), Some("admin"));
        assert_eq!(config.engine, Some(EngineKind::Flat));
        assert!(config.debug);
        assert!(!config.is_read_only());
        assert!(Config::new("/tmp/db").is_read_only());
    }

    #[test]
    fn environment_overlay() {
        let config = Config::new("/tmp/db")
            .overlay(Some("1"), Some("flat"))
            .expect("overlay");
        assert!(config.debug);
        assert_eq!(config.engine, Some(EngineKind::Flat));

        let config = Config::new("/tmp/db")
            .overlay(Some(""), Some("auto"))
            .expect("overlay");
        assert!(!config.debug);
        assert_eq!(config.engine, None);

        assert!(matches!(
            Config::new("/tmp/db").overlay(None, Some("bsddb")),
            Err(HyperdbError::Value(_))
        ));
    }
}
