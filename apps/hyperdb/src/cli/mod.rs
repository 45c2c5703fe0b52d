//! # hyperdb CLI Module
//!
//! ## Available Commands
//!
//! - `classes` - Show classes and their properties
//! - `list` - List active nodes of a class
//! - `get` - Show a node or one property
//! - `history` - Show a node's journal
//! - `create` / `set` - Create or modify a node from `prop=value` pairs
//! - `retire` / `restore` - Soft-delete a node or bring it back
//! - `lookup` - Resolve a key value to an id
//! - `filter` - Filter and sort a class
//! - `pack` - Compact journals older than a date

mod commands;

use clap::{Parser, Subcommand};
use hyperdb_core::{Config, Database, HyperdbError};
use std::path::PathBuf;

use crate::tracker::Tracker;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// hyperdb - inspect and maintain a tracker database
#[derive(Parser, Debug)]
#[command(name = "hyperdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Tracker file holding the database location and class schema
    #[arg(long, global = true, default_value = "tracker.toml")]
    pub tracker: PathBuf,

    /// Database directory (overrides the tracker file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Journal tag to write as; omit to open read-only
    #[arg(short = 't', long, global = true)]
    pub tag: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show every class with its properties
    Classes,

    /// List the active nodes of a class
    List {
        /// Class name
        class: String,
    },

    /// Show every property of a node, or just one
    Get {
        /// Node designator, e.g. issue12
        designator: String,
        /// Property name
        property: Option<String>,
    },

    /// Show the journal of a node
    History {
        /// Node designator
        designator: String,
    },

    /// Create a node
    Create {
        /// Class name
        class: String,
        /// Property assignments, prop=value
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Modify a node
    Set {
        /// Node designator
        designator: String,
        /// Property assignments, prop=value
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Retire a node
    Retire {
        /// Node designator
        designator: String,
    },

    /// Restore a retired node
    Restore {
        /// Node designator
        designator: String,
    },

    /// Find the node holding a key value
    Lookup {
        /// Class name
        class: String,
        /// Key value
        key: String,
    },

    /// Filter and sort the nodes of a class
    Filter {
        /// Class name
        class: String,
        /// Constraint prop=value[,value...]; repeatable
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,
        /// Sort key, '-' prefix for descending; repeatable
        #[arg(long)]
        sort: Vec<String>,
        /// Group key, '-' prefix for descending; repeatable
        #[arg(long)]
        group: Vec<String>,
    },

    /// Pack journals: drop entries older than a date or interval ago
    Pack {
        /// Cutoff date (2003-01-01) or interval (2w)
        #[arg(long)]
        before: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Open the database the CLI flags and tracker file describe.
pub fn open_database(cli: &Cli) -> Result<Database, HyperdbError> {
    let tracker = Tracker::load(&cli.tracker)?;
    let dir = cli
        .database
        .clone()
        .or_else(|| tracker.dir.clone())
        .ok_or_else(|| {
            HyperdbError::Value(format!(
                "no database directory: pass -D or set [database] dir in {}",
                cli.tracker.display()
            ))
        })?;
    let mut config = Config::new(dir);
    if let Some(engine) = tracker.engine {
        config = config.with_engine(engine);
    }
    if let Some(tag) = &cli.tag {
        config = config.with_journal_tag(tag);
    }
    let config = config.from_env()?;
    tracing::debug!(
        dir = %config.dir.display(),
        read_only = config.is_read_only(),
        classes = tracker.schema.classes.len(),
        "opening tracker"
    );
    let mut db = Database::open(config)?;
    tracker.schema.apply(&mut db)?;
    Ok(db)
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), HyperdbError> {
    let mut db = open_database(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Classes => cmd_classes(&mut db, json_mode),
        Commands::List { class } => cmd_list(&mut db, json_mode, &class),
        Commands::Get {
            designator,
            property,
        } => cmd_get(&mut db, json_mode, &designator, property.as_deref()),
        Commands::History { designator } => cmd_history(&mut db, json_mode, &designator),
        Commands::Create { class, assignments } => mutate(&mut db, |db| {
            cmd_create(db, json_mode, &class, &assignments)
        }),
        Commands::Set {
            designator,
            assignments,
        } => mutate(&mut db, |db| cmd_set(db, json_mode, &designator, &assignments)),
        Commands::Retire { designator } => {
            mutate(&mut db, |db| cmd_retire(db, json_mode, &designator))
        }
        Commands::Restore { designator } => {
            mutate(&mut db, |db| cmd_restore(db, json_mode, &designator))
        }
        Commands::Lookup { class, key } => cmd_lookup(&mut db, json_mode, &class, &key),
        Commands::Filter {
            class,
            filters,
            sort,
            group,
        } => cmd_filter(&mut db, json_mode, &class, &filters, &sort, &group),
        Commands::Pack { before } => cmd_pack(&mut db, json_mode, &before),
    }
}

/// Run `op`; commit if it succeeds, roll back if it fails.
pub fn mutate<T>(
    db: &mut Database,
    op: impl FnOnce(&mut Database) -> Result<T, HyperdbError>,
) -> Result<T, HyperdbError> {
    match op(db) {
        Ok(value) => {
            db.commit()?;
            Ok(value)
        }
        Err(e) => {
            db.rollback();
            Err(e)
        }
    }
}
