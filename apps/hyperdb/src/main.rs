//! # hyperdb
//!
//! Command-line maintenance tool for a hyperdatabase directory.
//!
//! ## Usage
//!
//! ```bash
//! # Inspect
//! hyperdb classes
//! hyperdb list issue
//! hyperdb get issue12 title
//! hyperdb history issue12
//!
//! # Modify (needs a journal tag)
//! hyperdb -t admin create issue title="printer on fire" status=open
//! hyperdb -t admin set issue12 status=closed
//!
//! # Filter and pack
//! hyperdb filter issue -f status=open,pending --sort=-activity
//! hyperdb -t admin pack --before 2w
//! ```

use clap::Parser;
use hyperdb::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // HYPERDB_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("HYPERDB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    // HYPERDBDEBUG logs every database operation; let all of them through.
    let core_debug = std::env::var("HYPERDBDEBUG").is_ok_and(|v| !v.trim().is_empty());
    let default_filter = if core_debug {
        "hyperdb=trace,hyperdb_core=trace"
    } else if cli.verbose {
        "hyperdb=debug,hyperdb_core=debug"
    } else {
        "hyperdb=info,hyperdb_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
